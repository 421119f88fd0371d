//! Decomposition-based multi-objective evolutionary loop (MOEA/D).
//!
//! The population is split into one scalar subproblem per member, each
//! defined by a weight vector. Every generation visits each subproblem
//! once, creates one offspring from mates in its neighbourhood, evaluates
//! it and lets it replace up to `limit` neighbours it improves on under
//! the Tchebycheff scalarization.
//!
//! # Key Types
//!
//! - [`MoeadConfig`]: Decomposition and variation parameters
//! - [`CampaignRunner`]: Executes (or resumes) a campaign
//! - [`CampaignResult`]: Final population with statistics
//!
//! # Submodules
//!
//! - [`weights`]: Grid and random weight vectors, neighbourhoods
//! - [`operators`]: DE/rand/1, polynomial mutation, repair, Tchebycheff
//!
//! # References
//!
//! - Zhang & Li (2007), *MOEA/D: A Multiobjective Evolutionary Algorithm
//!   Based on Decomposition*
//! - Li & Zhang (2009), *Multiobjective Optimization Problems With
//!   Complicated Pareto Sets, MOEA/D and NSGA-II*

mod config;
pub mod operators;
mod runner;
pub mod weights;

pub use config::{MoeadConfig, WeightGeneration};
pub use runner::{CampaignResult, CampaignRunner, GenerationStats};
