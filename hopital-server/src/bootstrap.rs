//! Startup seeding: departments and the first administrator

use hopital_core::{profile, NewProfile, Role};
use hopital_store::{NewAccount, SqliteStore, StoreError};

use crate::config::ServerConfig;
use crate::password::hash_password;

/// What startup seeding changed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub departments_added: usize,
    /// User id of the administrator created from `bootstrap`
    pub admin_created: Option<String>,
}

/// Seed departments, then create the bootstrap administrator when no active
/// administrator exists
pub fn seed(store: &SqliteStore, config: &ServerConfig) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport {
        departments_added: store.seed_departments(&config.departments)?,
        ..Default::default()
    };
    if report.departments_added > 0 {
        tracing::info!(added = report.departments_added, "Departments seeded");
    }

    let Some(ref admin) = config.bootstrap else {
        if store.active_admin_count()? == 0 {
            tracing::warn!(
                "No active administrator and no bootstrap account configured (set HOPITAL_ADMIN_EMAIL and HOPITAL_ADMIN_PASSWORD)"
            );
        }
        return Ok(report);
    };

    if store.active_admin_count()? > 0 {
        tracing::debug!("Active administrator present, bootstrap account skipped");
        return Ok(report);
    }
    if store.find_profile_by_email(&admin.email)?.is_some() {
        tracing::warn!(
            email = %admin.email,
            "Bootstrap email already belongs to an account, no administrator created"
        );
        return Ok(report);
    }

    profile::validate_password(&admin.password)?;
    let new_profile = NewProfile {
        full_name: admin.full_name.clone(),
        email: admin.email.clone(),
        role: Role::Admin,
        is_active: true,
        ..Default::default()
    }
    .normalize()?;
    let password_hash =
        hash_password(&admin.password).map_err(|e| StoreError::Other(e.notice.message))?;

    let created = store.create_account(NewAccount {
        profile: new_profile,
        password_hash,
        departments: Vec::new(),
        created_by: None,
    })?;
    tracing::info!(user_id = %created.user_id, email = %created.email, "Bootstrap administrator created");
    report.admin_created = Some(created.user_id);
    Ok(report)
}
