pub mod accounts;
pub mod doctors;
pub mod files;
pub mod patients;
pub mod scheduler;
pub mod storage;
