//! Sea-ORM entities of the relational store.
//!
//! Rows here are the source of truth for sessions, lobbies and users; the
//! networking cache only holds views over them.

pub mod lobby;
pub mod message;
pub mod session;
pub mod user;
