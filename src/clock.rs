use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Nanoseconds since the process-wide reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RelativeTimestamp {
    pub nanos: i64,
}

impl RelativeTimestamp {
    pub const ZERO: Self = RelativeTimestamp { nanos: 0 };

    pub fn as_nanos(&self) -> i64 {
        self.nanos
    }
}

impl fmt::Display for RelativeTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.nanos)
    }
}

static REFERENCE: OnceLock<i64> = OnceLock::new();
static HIGH_WATER: AtomicI64 = AtomicI64::new(0);

/// Reading of the boot clock, which keeps counting while the machine is
/// suspended. `None` if the kernel refuses the call.
#[cfg(target_os = "linux")]
fn boottime_nanos() -> Option<i64> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `now` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut now) };
    if rc != 0 {
        return None;
    }
    Some(
        i64::from(now.tv_sec)
            .saturating_mul(1_000_000_000)
            .saturating_add(i64::from(now.tv_nsec)),
    )
}

fn instant_nanos() -> i64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = *ANCHOR.get_or_init(Instant::now);
    i64::try_from(anchor.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(target_os = "linux")]
fn clock_nanos() -> i64 {
    boottime_nanos().unwrap_or_else(instant_nanos)
}

#[cfg(not(target_os = "linux"))]
fn clock_nanos() -> i64 {
    instant_nanos()
}

/// The reference reading, captured on first use and never reset.
pub fn reference_nanos() -> i64 {
    *REFERENCE.get_or_init(clock_nanos)
}

/// Monotonic time since [`reference_nanos`]. Wall-clock adjustments have no
/// effect; on Linux, time spent suspended is included.
///
/// Two threads can read the clock and then race to publish. The high-water
/// mark makes the returned values follow the order in which calls complete,
/// so no caller ever observes time going backwards.
pub fn now_relative() -> RelativeTimestamp {
    let reference = reference_nanos();
    let nanos = clock_nanos().saturating_sub(reference).max(0);

    let previous = HIGH_WATER.fetch_max(nanos, Ordering::AcqRel);
    RelativeTimestamp {
        nanos: previous.max(nanos),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn successive_reads_never_decrease() {
        let mut last = now_relative();
        for _ in 0..10_000 {
            let next = now_relative();
            assert!(next >= last, "{next} went back from {last}");
            last = next;
        }
    }

    #[test]
    fn reads_from_many_threads_follow_completion_order() {
        // Each thread appends under the same lock it reads the clock in, so the
        // log is ordered by real time.
        let log = Arc::new(Mutex::new(Vec::new()));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut log = log.lock().unwrap();
                        log.push(now_relative());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let log = log.lock().unwrap();
        assert!(log.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn reference_is_fixed() {
        assert_eq!(reference_nanos(), reference_nanos());
        assert!(now_relative().as_nanos() >= 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_readings_come_from_the_boot_clock() {
        let reference = reference_nanos();
        let before = boottime_nanos().expect("CLOCK_BOOTTIME is available");
        let relative = now_relative().as_nanos();
        let after = boottime_nanos().expect("CLOCK_BOOTTIME is available");

        assert!(reference <= before);
        assert!(relative >= 0);
        assert!(relative <= after - reference, "{relative} is ahead of the boot clock");
    }
}
