use crate::error::{UrbisError, UrbisResult};
use crate::ids::Actor;
use crate::model::Project;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// Authorization seam. The store calls it before touching a project's scenarios
/// and returns its `Forbidden` unchanged.
pub trait AccessPolicy: Send + Sync {
    fn check(&self, project: &Project, actor: Option<&Actor>, access: Access) -> UrbisResult<()>;
}

/// Owners and superusers read and write; anyone reads a public project.
#[derive(Clone, Copy, Debug, Default)]
pub struct OwnershipPolicy;

impl AccessPolicy for OwnershipPolicy {
    fn check(&self, project: &Project, actor: Option<&Actor>, access: Access) -> UrbisResult<()> {
        let privileged = actor.is_some_and(|a| a.is_superuser || a.id == project.user_id);
        let allowed = match access {
            Access::Read => privileged || project.is_public,
            Access::Write => privileged,
        };
        if allowed {
            Ok(())
        } else {
            Err(UrbisError::forbidden(format!(
                "no {} access to project {}",
                match access {
                    Access::Read => "read",
                    Access::Write => "write",
                },
                project.project_id
            )))
        }
    }
}

/// Accepts everything; for callers that authorize upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrustCaller;

impl AccessPolicy for TrustCaller {
    fn check(&self, _project: &Project, _actor: Option<&Actor>, _access: Access) -> UrbisResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ProjectId, TerritoryId, Timestamp, UserId};

    fn project(is_public: bool) -> Project {
        Project {
            project_id: ProjectId(1),
            user_id: UserId("owner".into()),
            name: "p".into(),
            region_id: TerritoryId(1),
            is_regional: false,
            is_public,
            territory: None,
            context_territories: Vec::new(),
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    #[test]
    fn public_projects_are_readable_not_writable() {
        let policy = OwnershipPolicy;
        let stranger = Actor::user("stranger");
        assert!(policy.check(&project(true), Some(&stranger), Access::Read).is_ok());
        assert!(matches!(
            policy.check(&project(true), Some(&stranger), Access::Write),
            Err(UrbisError::Forbidden { .. })
        ));
        assert!(policy.check(&project(false), None, Access::Read).is_err());
    }

    #[test]
    fn owner_and_superuser_write() {
        let policy = OwnershipPolicy;
        assert!(policy.check(&project(false), Some(&Actor::user("owner")), Access::Write).is_ok());
        assert!(policy.check(&project(false), Some(&Actor::superuser("root")), Access::Write).is_ok());
    }
}
