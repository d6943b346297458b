pub mod layout;
pub mod doc_log;
pub mod doc_index;
pub mod wal;
pub mod doc_store;
