pub mod input_file;
pub mod job;
pub mod job_run;

pub use input_file::InputFile;
pub use job::{Job, NewJob};
pub use job_run::JobRun;
