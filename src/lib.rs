//! Multiple-choice programming quiz served from a cache of model-generated
//! questions.
//!
//! A [`quiz::refill::RefillWorker`] keeps the shared [`quiz::cache::QuestionCache`]
//! topped up in the background, and chat handlers take questions through
//! [`quiz::accessor::CacheAccessor::obtain`], which falls back to generating on
//! demand when the cache stays empty.

pub mod config;
pub mod quiz;
