pub mod input_file_repo;
pub mod job_repo;
pub mod job_run_repo;

pub use input_file_repo::InputFileRepo;
pub use job_repo::{JobRepo, TransitionError};
pub use job_run_repo::JobRunRepo;
