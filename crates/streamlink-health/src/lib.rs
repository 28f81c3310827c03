//! streamlink-health: deciding whether a deployed workload is usable.
//!
//! [`classify`] turns a raw [`WorkloadSnapshot`](streamlink_core::WorkloadSnapshot)
//! into one [`HealthStatus`](streamlink_core::HealthStatus) using a fixed
//! decision list. [`HealthPoller`] repeats that classification against a
//! live executor until the workload is running, has failed, or the deadline
//! passes.
//!
//! ```text
//! get_instance_health ──▶ classify ──▶ running      → ready
//!        ▲                           ├─ failed       → not ready (stop)
//!        └──── sleep(interval) ◀─────┴─ anything else → retry until deadline
//! ```

pub mod classifier;
pub mod poller;

pub use classifier::classify;
pub use poller::HealthPoller;
