pub mod check;
pub mod install;
pub mod version;
pub mod vet;
