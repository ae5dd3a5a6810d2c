//! Fixed sample data for development and test databases.

use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::{
    MemberRole, Project, ProjectMember, ProjectTask, Record, TaskStatus, User, UserRole,
};
use crate::error::Result;

/// One document ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub collection: &'static str,
    pub id: String,
    pub document: Value,
}

impl SeedRecord {
    pub fn from_record<R>(record: &R) -> Result<Self>
    where
        R: Record + Serialize,
    {
        Ok(Self {
            collection: R::COLLECTION,
            id: record.id().to_string(),
            document: serde_json::to_value(record)?,
        })
    }
}

/// Default records with stable identifiers, parents before children.
pub fn default_records() -> Result<Vec<SeedRecord>> {
    let admin = User::new("seed-user-admin", "Ada Admin", "admin@example.com", UserRole::Admin);
    let member = User::new("seed-user-member", "Max Member", "member@example.com", UserRole::Member);

    let apollo = Project::new("seed-project-apollo", "Apollo", &admin.id)
        .with_description("Sample project with a few open tasks");
    let gemini = Project::new("seed-project-gemini", "Gemini", &member.id);

    let memberships = [
        ProjectMember {
            id: "seed-member-apollo-admin".to_string(),
            project_id: apollo.id.clone(),
            user_id: admin.id.clone(),
            role: MemberRole::Owner,
        },
        ProjectMember {
            id: "seed-member-apollo-member".to_string(),
            project_id: apollo.id.clone(),
            user_id: member.id.clone(),
            role: MemberRole::Editor,
        },
        ProjectMember {
            id: "seed-member-gemini-member".to_string(),
            project_id: gemini.id.clone(),
            user_id: member.id.clone(),
            role: MemberRole::Owner,
        },
    ];

    let tasks = [
        ProjectTask {
            id: "seed-task-apollo-1".to_string(),
            project_id: apollo.id.clone(),
            title: "Draft the launch checklist".to_string(),
            status: TaskStatus::InProgress,
            assignee_id: Some(admin.id.clone()),
        },
        ProjectTask {
            id: "seed-task-apollo-2".to_string(),
            project_id: apollo.id.clone(),
            title: "Review telemetry dashboard".to_string(),
            status: TaskStatus::Todo,
            assignee_id: None,
        },
    ];

    let mut records = vec![
        SeedRecord::from_record(&admin)?,
        SeedRecord::from_record(&member)?,
        SeedRecord::from_record(&apollo)?,
        SeedRecord::from_record(&gemini)?,
    ];
    for membership in &memberships {
        records.push(SeedRecord::from_record(membership)?);
    }
    for task in &tasks {
        records.push(SeedRecord::from_record(task)?);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RESET_ORDER;
    use std::collections::HashSet;

    #[test]
    fn test_seed_ids_are_unique_and_stable() {
        let first = default_records().unwrap();
        let second = default_records().unwrap();

        let ids: HashSet<_> = first.iter().map(|r| (r.collection, r.id.clone())).collect();
        assert_eq!(ids.len(), first.len());

        let first_ids: Vec<_> = first.iter().map(|r| r.id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|r| r.id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_seed_inserts_parents_first() {
        let records = default_records().unwrap();
        let position = |collection: &str| {
            records
                .iter()
                .position(|r| r.collection == collection)
                .unwrap()
        };

        // Insertion order is the reverse of the deletion order.
        for pair in RESET_ORDER.windows(2) {
            assert!(position(pair[1]) < position(pair[0]));
        }
    }

    #[test]
    fn test_seed_documents_carry_their_id() {
        for record in default_records().unwrap() {
            assert_eq!(record.document["id"], Value::String(record.id.clone()));
        }
    }
}
