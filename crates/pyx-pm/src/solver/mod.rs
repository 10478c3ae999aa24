//! Backtracking dependency resolver for Python packages.
//!
//! Selects exactly one version per normalized package name such that every
//! requirement, marker and extra in the transitive closure is satisfied.
//!
//! # Architecture
//!
//! - [`Request`]: root requirements, target environment, lock pins and the
//!   upgrade strategy
//! - [`Policy`]: filters and orders the versions of a package
//! - `SearchState`: asserted requirements per name, the partial graph and
//!   a trail of changes for rewinding
//! - `Decisions`: the explicit decision stack
//! - [`Resolver`]: the search loop
//!
//! # Algorithm Overview
//!
//! 1. **Selection**: among pending names, pick the one with the fewest
//!    acceptable versions; ties go to the smaller name
//! 2. **Ordering**: a satisfying lock pin first (unless upgrading), then
//!    newest to oldest
//! 3. **Commit**: fetch the chosen version's metadata, assert its
//!    dependencies and those of every requested extra
//! 4. **Backjumping**: every asserted requirement records the decisions
//!    that produced it; when a package runs out of versions the search
//!    returns straight to the most recent of those decisions
//! 5. **Failure**: a conflict no decision can undo becomes a
//!    [`ConflictReport`]
//!
//! # Example
//!
//! ```
//! use pyx_pm::provider::InMemoryProvider;
//! use pyx_pm::requirement::MarkerEnvironment;
//! use pyx_pm::solver::{Request, Resolver};
//! use pyx_pm::ResolverConfig;
//!
//! # tokio_test::block_on(async {
//! let index = InMemoryProvider::builder()
//!     .release("a", "1.0", &[])
//!     .release("a", "1.5", &[])
//!     .release("b", "1.0", &["a>=1.3"])
//!     .build()
//!     .unwrap();
//!
//! let request = Request::parse(&["a>=1,<2", "b==1.0"], MarkerEnvironment::cpython("3.11.4")).unwrap();
//! let graph = Resolver::new(&index, ResolverConfig::default())
//!     .resolve(&request)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(graph.get("a").unwrap().version.to_string(), "1.5");
//! # });
//! ```

mod cancel;
mod candidate;
mod decisions;
mod graph;
mod policy;
mod problem;
mod request;
mod solver;
mod state;


pub use cancel::CancellationToken;
pub use candidate::Candidate;
pub use graph::{Edge, Requirer, ResolutionGraph};
pub use policy::Policy;
pub use problem::{ChainLink, ConflictReport, ConflictingRequirement};
pub use request::{Pin, Request, Upgrade};
pub use solver::Resolver;
