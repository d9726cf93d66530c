pub mod config_cmd;
pub mod list;
pub mod resume;
pub mod run;
