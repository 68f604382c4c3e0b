use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

use crate::{Error, Result};

pub const CPU_THREADS_ENV: &str = "MONTAGE_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<Result<()>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by the parallel solver stages.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `MONTAGE_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Only the first call takes effect; later calls return the first outcome.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured_threads = match num_threads {
            Some(n) => Some(n),
            None => read_cpu_threads_from_env()?,
        };

        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured_threads {
            if n == 0 {
                return Err(Error::InvalidParameter(format!(
                    "{CPU_THREADS_ENV} must be >= 1"
                )));
            }
            builder = builder.num_threads(n);
        }

        builder.build_global().map_err(|e| Error::InvalidState(e.to_string()))?;
        tracing::debug!(threads = rayon::current_num_threads(), "initialized global thread pool");
        Ok(())
    });
    res.clone()
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn read_cpu_threads_from_env() -> Result<Option<usize>> {
    let raw = match env::var(CPU_THREADS_ENV) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(Error::InvalidParameter(format!(
                "failed to read {CPU_THREADS_ENV}: {e}"
            )))
        }
    };
    parse_thread_count(&raw).map(Some)
}

fn parse_thread_count(raw: &str) -> Result<usize> {
    let parsed: usize = raw.trim().parse().map_err(|_| {
        Error::InvalidParameter(format!(
            "{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"
        ))
    })?;
    if parsed == 0 {
        return Err(Error::InvalidParameter(format!(
            "{CPU_THREADS_ENV} must be >= 1"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_parsing() {
        assert_eq!(parse_thread_count("4").unwrap(), 4);
        assert_eq!(parse_thread_count(" 2 ").unwrap(), 2);
        assert!(parse_thread_count("0").is_err());
        assert!(parse_thread_count("many").is_err());
    }

    #[test]
    fn init_is_idempotent() {
        let first = init_global_thread_pool(Some(2));
        let second = init_global_thread_pool(Some(8));
        assert_eq!(first, second);
        assert!(current_cpu_threads() >= 1);
    }
}
