mod matrix_tests;
mod parse_tests;
mod pca_tests;
