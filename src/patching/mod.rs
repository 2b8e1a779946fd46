//! Rewrite engine, patch passes and their orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         PatcherRegistry                          │
//! │   assembly file name  ──►  [Patcher, Patcher, ...] (in order)    │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ Patcher::patch(module, env)
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Pass                                                            │
//! │   resolve helpers (AssemblyResolver)                             │
//! │   PatchCache hit?  ── yes ──►  replay recorded methods only      │
//! │        │ no                                                      │
//! │        ▼                                                         │
//! │   rewrite_method(body, RewriteRule) for every candidate method   │
//! │        expand ─► match back to front ─► replace in place ─►      │
//! │        compact (offsets, short forms, max stack)                 │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//!                     PatchReport per pass, optional dump
//! ```
//!
//! # Key Components
//!
//! - [`RewriteRule`] and [`rewrite_method`] - the pattern driven rewriter shared by all passes
//! - [`edit_method`] - free-form edits of one body with the same restore-on-error discipline
//! - [`Patcher`] - one pass over one module, reporting a [`PatchReport`]
//! - [`PatchCache`] - methods a pass changed, keyed by a fingerprint of the target assembly
//! - [`PatcherRegistry`] - which passes run on which assembly
//!
//! # Passes
//!
//! | Pass                          | Effect                                                    |
//! |-------------------------------|-----------------------------------------------------------|
//! | [`CallRedirectPatcher`]       | Redirects calls of a member to a static replacement       |
//! | [`FieldAccessPatcher`]        | Routes tracked field accesses through by-name accessors   |
//! | [`AccessorForwardingPatcher`] | Replaces typed accessors by forwarders to a backend       |
//! | [`TypeLookupGuardPatcher`]    | Seeds and guards the FSM runtime's reflective type lookup |
//! | [`ReflectiveGetterPatcher`]   | Routes the reflective bulk read through `GetVariable<T>`  |

mod accessor_bodies;
mod cache;
mod call_redirect;
mod config;
mod field_access;
mod pass;
mod reflective_getter;
mod registry;
mod rewriter;
mod type_lookup_guard;

pub use accessor_bodies::AccessorForwardingPatcher;
pub use cache::{fingerprint, PatchCache};
pub use call_redirect::{CallRedirect, CallRedirectPatcher, HELPER_MODULE, HELPER_TYPE};
pub use config::PatcherConfig;
pub use field_access::{FieldAccessConfig, FieldAccessPatcher};
pub use pass::{PatchEnvironment, PatchReport, Patcher};
pub use reflective_getter::ReflectiveGetterPatcher;
pub use registry::PatcherRegistry;
pub use rewriter::{
    apply_replacement, edit_method, rewrite_method, Replacement, RewriteContext, RewriteRule,
    RewriteStats, ScratchLocals,
};
pub use type_lookup_guard::TypeLookupGuardPatcher;
