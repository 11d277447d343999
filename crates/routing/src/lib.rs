//! Classification service: labels each question with a category and hands
//! it to that category's worker.

pub mod classifier;
pub mod history;
pub mod server;

pub use {
    classifier::{Classification, Classifier, MatchKind},
    history::HistoryStore,
    server::{build_classifier_app, start_classifier},
};
