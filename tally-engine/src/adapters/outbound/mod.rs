mod json_ledger;
mod memory;
mod scripted_generator;

pub use json_ledger::JsonFileLedgerStore;
pub use memory::InMemoryRecordStore;
pub use scripted_generator::ScriptedWeightGenerator;
