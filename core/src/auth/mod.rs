//! Session synchronization between the auth service and what the UI renders.

pub mod backend;
pub mod coordinator;
pub mod memory;
pub mod session;
pub mod state;
pub mod supabase;
pub mod token_store;

pub use backend::{AuthBackend, AuthChangeStream, ChangeSequence, RealtimeChannel};
pub use coordinator::{AuthCoordinator, AuthSubscription, CleanupOutcome, CleanupStep, SignOutReport};
pub use memory::InMemoryAuthBackend;
pub use session::{AuthChange, AuthEvent, AuthResponse, Session, SignOutScope, User};
pub use state::{AuthPhase, AuthSnapshot, AuthState};
pub use supabase::SupabaseAuthClient;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreKind};
