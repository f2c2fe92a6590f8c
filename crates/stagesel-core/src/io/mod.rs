//! Input readers for the experiment matrices.
pub mod matrix;

pub use matrix::{load_imputed_matrix, load_names_npy, load_target_matrix, ImputedMatrix};
