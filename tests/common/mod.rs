use elava::model::{Metadata, Resource, Tags};
use time::OffsetDateTime;

pub fn sample_resource(id: &str) -> Resource {
    let now = OffsetDateTime::now_utc();
    Resource {
        id: id.to_string(),
        resource_type: "ec2".to_string(),
        provider: "aws".to_string(),
        region: "us-east-1".to_string(),
        account_id: "123456789012".to_string(),
        name: format!("{id}-name"),
        status: "running".to_string(),
        tags: Tags {
            owner: "team-a".to_string(),
            team: "team-a".to_string(),
            environment: "production".to_string(),
            ..Default::default()
        },
        metadata: Metadata::default(),
        created_at: now,
        last_seen_at: now,
        is_orphaned: false,
    }
}

pub fn tagless_resource(id: &str) -> Resource {
    let mut r = sample_resource(id);
    r.tags = Tags::default();
    r
}
