//! Seeding default tunables for a tenant (idempotent).

use serde::Serialize;
use tracing::info;

use crate::domain::policy::default_tunables;
use crate::domain::{StoreError, TenantId};
use crate::ports::TunablesWriter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
}

/// Write the default value of every tunable that is missing for `tenant`.
///
/// Existing values are kept unless `force` is set.
pub async fn seed_defaults(
    writer: &dyn TunablesWriter,
    tenant: &TenantId,
    force: bool,
) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();
    for (key, value) in default_tunables() {
        let existing = writer.get_json(tenant, key).await?;
        match existing {
            None => {
                writer.set_json(tenant, key, value).await?;
                report.inserted += 1;
            }
            Some(_) if force => {
                writer.set_json(tenant, key, value).await?;
                report.updated += 1;
            }
            Some(_) => report.skipped += 1,
        }
    }

    info!(
        %tenant,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        "seeded tenant settings"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys;
    use crate::impls::InMemoryTunables;
    use serde_json::json;

    #[tokio::test]
    async fn seeding_is_idempotent_unless_forced() {
        let tunables = InMemoryTunables::new();
        let tenant = TenantId::new("acme").unwrap();
        tunables.set(&tenant, keys::TTL_DAYS, json!(3)).await;

        let first = seed_defaults(&tunables, &tenant, false).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                inserted: 3,
                updated: 0,
                skipped: 1
            }
        );
        assert_eq!(
            tunables.get_json(&tenant, keys::TTL_DAYS).await.unwrap(),
            Some(json!(3))
        );

        let second = seed_defaults(&tunables, &tenant, false).await.unwrap();
        assert_eq!(second.skipped, 4);

        let forced = seed_defaults(&tunables, &tenant, true).await.unwrap();
        assert_eq!(forced.updated, 4);
        assert_eq!(
            tunables.get_json(&tenant, keys::TTL_DAYS).await.unwrap(),
            Some(json!(14))
        );
    }
}
