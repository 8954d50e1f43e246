mod tests_aliasing;
