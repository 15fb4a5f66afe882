pub mod ledger_reader;
pub mod payment_writer;
pub mod roster_reader;
