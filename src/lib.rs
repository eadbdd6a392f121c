//! Stochastic local-search and simulated-annealing core for scheduling
//! and register allocation of straight-line x86-64 field-arithmetic
//! assembly. See each module's documentation for the component it
//! implements; `orchestrator::run` is the single entry point tying every
//! component together into one optimization run.

pub mod analyser;
pub mod assemble;
pub mod bet;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod measure;
pub mod model;
pub mod optimizer;
pub mod orchestrator;
pub mod prover;
pub mod rng;
pub mod session;
