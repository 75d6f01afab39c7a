pub mod git;
pub mod instructions;
pub mod manager;

pub use git::{Checkout, GitCheckout};
pub use instructions::write_instructions;
pub use manager::{Workspace, WorkspaceManager, WorkspaceState};
