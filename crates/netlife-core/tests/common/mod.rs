pub mod capture;
pub mod echo;
