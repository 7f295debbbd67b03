//! Database table modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for one table group.

mod agents; // agents (tenant config + compiled instructions + deploy creds)
mod chat_messages; // chat_messages (append-only transcripts)
mod identities; // end_users, admins
mod sessions; // sessions (mode/status state machine)
mod usage_records; // usage_records (token ledger)
