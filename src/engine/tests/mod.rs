pub mod helpers;
mod tests_reset;
