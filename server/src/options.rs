use std::path::PathBuf;
use structopt::StructOpt;

/// Server options, to be specified as arguments or environment variables.
#[derive(Debug, StructOpt)]
#[structopt(name = "poll-server")]
pub struct Options {
    /// Address to listen on.
    #[structopt(long, env = "POLL_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,
    /// Persist sessions as JSON files in this directory. Sessions are kept in memory otherwise.
    #[structopt(long, env = "POLL_DATA_DIR", parse(from_os_str))]
    pub data_dir: Option<PathBuf>,
    /// Capacity of the server command queue.
    #[structopt(long, default_value = "64")]
    pub channel_capacity: usize,
}
