//! Machine learning helpers for training and inference.
//!
//! The session only talks to models through [`crate::classifier::Classifier`];
//! this module provides the in-process implementation the binary uses.

pub mod mlp;
