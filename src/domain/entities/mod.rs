pub mod project;
pub mod user;

pub use project::{MemberRole, Project, ProjectMember, ProjectTask, TaskStatus};
pub use user::{User, UserRole};

/// A persisted entity: the collection it lives in and its identifier.
pub trait Record {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// Collections in deletion order, children before the parents they reference.
pub const RESET_ORDER: &[&str] = &[
    ProjectTask::COLLECTION,
    ProjectMember::COLLECTION,
    Project::COLLECTION,
    User::COLLECTION,
];
