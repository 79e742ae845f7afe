//! Work stealing logic.

use crate::runtime::scheduler::local_queue::{LocalQueue, Stealer};
use crate::runtime::task::TaskRef;
use crate::util::XorShift64;

/// Tries each sibling once, starting from a random one, and steals half of
/// the first non-empty deque into `dest`.
pub(crate) fn steal_task(
    stealers: &[Stealer],
    dest: &LocalQueue,
    rng: &mut XorShift64,
) -> Option<TaskRef> {
    if stealers.is_empty() {
        return None;
    }
    let len = stealers.len();
    let start = rng.below(len);
    (0..len).find_map(|i| stealers[(start + i) % len].steal_half_into(dest))
}
