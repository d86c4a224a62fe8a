//! Replica shell around the consensus engine, plus everything needed to run
//! a group of replicas inside one process: a shared ledger executor, a load
//! generating client and the local simulation driver.

mod client;
mod ledger;
mod outbound;
mod replica;
mod simulation;


pub use client::{Client, ClientConfig, ClientHandle, Dispatch};
pub use ledger::{verify_consistency, ForkError, Ledger, LedgerEntry};
pub use outbound::Outbound;
pub use replica::{EventSender, Replica, SubmitError};
pub use simulation::{run_local, ReplicaReport, Rotation, SimulationConfig, SimulationReport};
