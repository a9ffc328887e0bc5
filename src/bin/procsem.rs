//! procsem diagnostics CLI (feature-gated).

use clap::{ArgAction, Args, Parser, Subcommand};
use procsem::time::{FixedClock, RealtimeClock, SystemClock, Timespec};
use procsem::{ErrorKind, RawSemaphore, SemaphoreConfig, Sharing, Timeout};
use std::io;
use std::ptr;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Semantic exit codes.
struct ExitCode;

impl ExitCode {
    /// User error - bad arguments or environment.
    const USER_ERROR: i32 = 1;
    /// Runtime error - an operation failed or behaved unexpectedly.
    const RUNTIME_ERROR: i32 = 2;
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] procsem::ConfigError),

    #[error("{step} failed: {source}")]
    Semaphore {
        step: &'static str,
        #[source]
        source: procsem::Error,
    },

    #[error("{step} failed: {source}")]
    Os {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Unexpected(String),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ExitCode::USER_ERROR,
            Self::Semaphore { .. } | Self::Os { .. } | Self::Unexpected(_) => {
                ExitCode::RUNTIME_ERROR
            }
        }
    }
}

trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, CliError>;
}

impl<T> StepExt<T> for procsem::Result<T> {
    fn step(self, step: &'static str) -> Result<T, CliError> {
        self.map_err(|source| CliError::Semaphore { step, source })
    }
}

#[derive(Parser, Debug)]
#[command(name = "procsem", version, about = "Process-shared semaphore diagnostics")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the size and alignment of a semaphore record
    Size,

    /// Run a lifecycle check on a semaphore in an anonymous shared mapping
    Selftest(SelftestArgs),

    /// Measure a timed wait on an empty semaphore
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct SelftestArgs {
    /// Also check that a forked child can post to the semaphore
    #[arg(long = "fork", action = ArgAction::SetTrue)]
    fork: bool,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Timeout in seconds (negative blocks forever, zero polls)
    #[arg(long = "timeout", default_value_t = 0.2, allow_negative_numbers = true)]
    timeout: f64,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Size => {
            println!("size: {} bytes", RawSemaphore::size());
            println!("align: {} bytes", RawSemaphore::align());
            println!("value max: {}", RawSemaphore::value_max());
            Ok(())
        }
        Command::Selftest(args) => selftest(&args),
        Command::Probe(args) => probe(args.timeout),
    }
}

/// An anonymous `MAP_SHARED` mapping, inherited by forked children.
struct SharedPage {
    addr: *mut u8,
    len: usize,
}

impl SharedPage {
    fn map(len: usize) -> Result<Self, CliError> {
        // SAFETY: anonymous mapping with no fixed address.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(CliError::Os {
                step: "mmap",
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            addr: addr.cast(),
            len,
        })
    }
}

impl Drop for SharedPage {
    fn drop(&mut self) {
        // SAFETY: unmapping the region created in `map`.
        unsafe { libc::munmap(self.addr.cast(), self.len) };
    }
}

fn selftest(args: &SelftestArgs) -> Result<(), CliError> {
    let config = SemaphoreConfig::from_env()?
        .sharing(Sharing::Process)
        .initial_value(1);
    let page = SharedPage::map(4096)?;

    // SAFETY: the page is fresh, page-aligned and outlives `sem`.
    let sem = unsafe { config.init_at(page.addr, page.len) }.step("init")?;
    let result = lifecycle(sem, args);
    // SAFETY: nothing waits on `sem` any more.
    let destroyed = unsafe { sem.destroy() }.step("destroy");
    result?;
    destroyed?;
    println!("selftest passed");
    Ok(())
}

fn lifecycle(sem: &RawSemaphore, args: &SelftestArgs) -> Result<(), CliError> {
    let before = sem.value().step("getvalue")?;
    println!("sem val: {before}");

    sem.wait(Timeout::Infinite).step("wait")?;
    let after = sem.value().step("getvalue")?;
    println!("after wait, sem val: {after}");
    if after + 1 != before {
        return Err(CliError::Unexpected(format!(
            "wait took {} permits",
            before.saturating_sub(after)
        )));
    }

    match sem.wait(Timeout::Immediate) {
        Err(err) if err.kind() == ErrorKind::WouldBlock => {}
        Err(source) => return Err(CliError::Semaphore { step: "poll", source }),
        Ok(()) => {
            return Err(CliError::Unexpected(
                "poll on an empty semaphore succeeded".into(),
            ))
        }
    }

    if args.fork {
        post_from_child(sem)?;
        sem.wait(Timeout::After(Duration::from_secs(5)))
            .step("wait for child")?;
        println!("child post observed");
    }

    sem.post().step("post")?;
    println!("after post, sem val: {}", sem.value().step("getvalue")?);
    Ok(())
}

fn post_from_child(sem: &RawSemaphore) -> Result<(), CliError> {
    // SAFETY: the child only posts and exits without unwinding.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(CliError::Os {
            step: "fork",
            source: io::Error::last_os_error(),
        });
    }
    if pid == 0 {
        let code = i32::from(sem.post().is_err());
        // SAFETY: terminate the child without running the parent's destructors.
        unsafe { libc::_exit(code) };
    }

    let mut status = 0;
    // SAFETY: `pid` is our child and `status` is writable.
    let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
    if rc < 0 {
        return Err(CliError::Os {
            step: "waitpid",
            source: io::Error::last_os_error(),
        });
    }
    if !libc::WIFEXITED(status) || libc::WEXITSTATUS(status) != 0 {
        return Err(CliError::Unexpected(format!(
            "child exited with status {status:#x}"
        )));
    }
    Ok(())
}

/// What a single wait on an empty semaphore did.
#[derive(Debug)]
struct ProbeOutcome {
    timeout: Timeout,
    /// The absolute deadline handed to `sem_timedwait`, for timed waits.
    deadline: Option<Timespec>,
    elapsed: Duration,
    kind: ErrorKind,
}

fn probe(timeout_secs: f64) -> Result<(), CliError> {
    let outcome = probe_once(timeout_secs)?;
    if let Some(deadline) = outcome.deadline {
        println!("deadline: {deadline}");
    }
    println!("requested: {}", outcome.timeout);
    println!("elapsed: {:?}", outcome.elapsed);
    println!("result: {:?}", outcome.kind);
    Ok(())
}

fn probe_once(timeout_secs: f64) -> Result<ProbeOutcome, CliError> {
    let timeout = Timeout::from_secs_f64(timeout_secs).step("timeout")?;
    if timeout == Timeout::Infinite {
        return Err(CliError::Unexpected(
            "an infinite wait on an empty semaphore never returns".into(),
        ));
    }

    let page = SharedPage::map(4096)?;
    // SAFETY: the page is fresh, page-aligned and outlives `sem`.
    let sem = unsafe { RawSemaphore::init_at(page.addr, page.len, Sharing::Process, 0) }
        .step("init")?;

    // Pin "now" so the reported deadline is the one the wait computes.
    let now = SystemClock.now().step("clock")?;
    let deadline = timeout.duration().map(|d| now.deadline_after(d));
    let start = Instant::now();
    let result = sem.wait_with_clock(timeout, &FixedClock::new(now));
    let elapsed = start.elapsed();
    // SAFETY: the wait has returned and nothing else uses `sem`.
    unsafe { sem.destroy() }.step("destroy")?;

    match result {
        Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            Ok(ProbeOutcome {
                timeout,
                deadline,
                elapsed,
                kind: err.kind(),
            })
        }
        Err(source) => Err(CliError::Semaphore { step: "wait", source }),
        Ok(()) => Err(CliError::Unexpected(
            "wait on an empty semaphore succeeded".into(),
        )),
    }
}
