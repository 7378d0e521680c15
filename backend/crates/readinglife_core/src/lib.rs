//! `readinglife_core`
//!
//! Storage layer of the Reading Life book review service: the `posts` record store, the
//! directory of uploaded cover images and the rewriting of stored image paths into public URLs.
//! The crate knows nothing about HTTP so it can be driven by the server crate as well as by tests.

pub mod database;

pub mod image_store;

pub mod urls;
