pub mod fixed;
pub mod scorer;
