//! Platform documentation: the markdown corpus and the FAQ.

pub mod corpus;
pub mod faq;

pub use corpus::{DocSection, DocsCorpus, SearchHit};
