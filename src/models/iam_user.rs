//! Cloud IAM user and group models
//!
//! Users and groups synchronized from cloud providers. Records are written by
//! the sync service; this crate only reads them for diagnostics.

use mongodb::bson::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Cloud IAM user record stored in `cloud_iam_users`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudIamUser {
    /// Numeric identifier assigned by the sync service
    pub id: i64,
    pub username: String,
    /// Permission groups the user is a member of; stored as `null` when empty
    #[serde(deserialize_with = "null_as_empty")]
    pub permission_groups: Vec<i64>,
    pub tenant_id: String,
    /// Cloud provider the user was synchronized from
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime>,
    /// Creation time in epoch milliseconds
    pub ctime: i64,
}

impl CloudIamUser {
    pub const COLLECTION: &'static str = "cloud_iam_users";

    /// Check if the user belongs to the given permission group
    pub fn is_member_of(&self, group_id: i64) -> bool {
        self.permission_groups.contains(&group_id)
    }

    /// Group list as printed in reports, e.g. `1, 4, 7`
    pub fn groups_display(&self) -> String {
        self.permission_groups
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Cloud IAM user group stored in `cloud_iam_groups`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudIamGroup {
    pub id: i64,
    pub name: String,
    /// Group name on the cloud side
    pub group_name: String,
    pub tenant_id: String,
    /// Number of members seen by the last sync
    pub member_count: i64,
}

impl CloudIamGroup {
    pub const COLLECTION: &'static str = "cloud_iam_groups";
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mongodb::bson::{doc, from_document, to_document, Bson};

    #[test]
    fn test_decode_partial_document() {
        let user: CloudIamUser = from_document(doc! {
            "id": 12_i64,
            "username": "alice",
            "permission_groups": [1, 3_i64],
            "tenant_id": "tenant-001",
        })
        .unwrap();

        assert_eq!(user.id, 12);
        assert_eq!(user.username, "alice");
        assert_eq!(user.permission_groups, vec![1, 3]);
        assert!(user.is_member_of(3));
        assert!(!user.is_member_of(2));
        assert_eq!(user.provider, "");
        assert!(user.create_time.is_none());
        assert_eq!(user.ctime, 0);
        assert_eq!(user.groups_display(), "1, 3");
    }

    #[test]
    fn test_null_groups_decode_as_empty() {
        let user: CloudIamUser = from_document(doc! {
            "id": 7_i64,
            "username": "nogroups",
            "permission_groups": Bson::Null,
        })
        .unwrap();

        assert!(user.permission_groups.is_empty());
        assert_eq!(user.groups_display(), "");
    }

    #[test]
    fn test_create_time_stored_as_bson_datetime() {
        let create_time = DateTime::from_chrono(
            chrono::DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        );
        let user = CloudIamUser {
            id: 1,
            username: "bob".to_string(),
            create_time: Some(create_time),
            ctime: 1_700_000_000_000,
            ..Default::default()
        };

        let document = to_document(&user).unwrap();
        assert!(document.get_datetime("create_time").is_ok());
        assert_eq!(document.get_i64("ctime").unwrap(), 1_700_000_000_000);

        let decoded: CloudIamUser = from_document(document).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_decode_group() {
        let group: CloudIamGroup = from_document(doc! {
            "id": 3_i64,
            "name": "ops",
            "group_name": "ops-cloud",
            "tenant_id": "tenant-001",
            "member_count": 4,
        })
        .unwrap();

        assert_eq!(group.member_count, 4);
        assert_eq!(group.group_name, "ops-cloud");
    }
}
