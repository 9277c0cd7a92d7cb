//! # Encodings
//!
//! Clausal encodings built by the optimizer. Encodings never hold on to an oracle, clauses are
//! handed to a [`rustsat::encodings::CollectClauses`] sink as they are generated and fresh
//! variables are taken from a [`rustsat::instances::ManageVars`] manager.

pub mod totalizer;
