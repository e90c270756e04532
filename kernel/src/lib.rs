// Alethia Kernel
//
// Append-only paginated log storage on a transactional key-value ledger:
// address derivation, page codec, the append state transition, and the
// client halves that write, read back and verify a log.

pub mod address;
pub mod client;
pub mod config;
pub mod invariants;
pub mod ledger;
pub mod log;
pub mod page;
pub mod replay;
pub mod simulate;
pub mod verify;
