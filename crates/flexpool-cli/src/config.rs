use anyhow::bail;
use clap::Parser;
use std::time::Duration;

/// Runtime configuration for the `flexpool` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honoured), with defaults that finish in well under a second.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flexpool",
    version,
    about = "Runs a resizable pool of negating workers and drains it gracefully"
)]
pub struct CliArgs {
    /// Number of workers started before any task is submitted.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Worker count to resize the pool to once half of the tasks have been
    /// submitted. Workers are added or removed one at a time.
    ///
    /// Environment variable: `RESIZE_TO`
    #[arg(long, env = "RESIZE_TO")]
    pub resize_to: Option<usize>,

    /// Number of tasks to submit before shutting the pool down.
    ///
    /// Environment variable: `NUM_TASKS`
    #[arg(long, env = "NUM_TASKS", default_value_t = 10_000)]
    pub num_tasks: u64,

    /// Capacity of the task channel. Submissions block while it is full.
    /// Zero makes every submission wait for a worker to receive it.
    ///
    /// Environment variable: `TASK_BUFFER_SIZE`
    #[arg(long, env = "TASK_BUFFER_SIZE", default_value_t = 64)]
    pub task_buffer_size: usize,

    /// Capacity of the result channel. Workers block while it is full.
    ///
    /// Environment variable: `RESULT_BUFFER_SIZE`
    #[arg(long, env = "RESULT_BUFFER_SIZE", default_value_t = 64)]
    pub result_buffer_size: usize,

    /// Simulated processing time per task, in microseconds.
    ///
    /// Environment variable: `WORK_DELAY_US`
    #[arg(long, env = "WORK_DELAY_US", default_value_t = 0)]
    pub work_delay_us: u64,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub num_workers: usize,
    pub resize_to: Option<usize>,
    pub num_tasks: u64,
    pub task_buffer_size: usize,
    pub result_buffer_size: usize,
    pub work_delay: Duration,
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        // Without workers a submission can block forever on a full channel.
        if args.resize_to == Some(0) && args.num_tasks > 1 {
            bail!("RESIZE_TO must be greater than 0 while tasks remain to be submitted");
        }

        Ok(Self {
            num_workers: args.num_workers,
            resize_to: args.resize_to,
            num_tasks: args.num_tasks,
            task_buffer_size: args.task_buffer_size,
            result_buffer_size: args.result_buffer_size,
            work_delay: Duration::from_micros(args.work_delay_us),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<RunConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("flexpool").chain(args.iter().copied()))?;
        RunConfig::try_from(args)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert!(config.num_workers > 0);
        assert_eq!(config.resize_to, None);
        assert_eq!(config.work_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_empty_pool() {
        let err = parse(&["--num-workers", "0"]).unwrap_err();
        assert_eq!(err.to_string(), "NUM_WORKERS must be greater than 0");
    }

    #[test]
    fn rejects_resizing_to_zero_mid_run() {
        assert!(parse(&["--resize-to", "0"]).is_err());
        assert!(parse(&["--resize-to", "0", "--num-tasks", "1"]).is_ok());
    }

    #[test]
    fn converts_delay_to_duration() {
        let config = parse(&["--work-delay-us", "250", "--resize-to", "8"]).unwrap();
        assert_eq!(config.work_delay, Duration::from_micros(250));
        assert_eq!(config.resize_to, Some(8));
    }
}
