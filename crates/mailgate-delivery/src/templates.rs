//! Template lookup and rendering
//!
//! Templates are stored per tenant with global fallbacks; rendering happens
//! at admission (to fail fast on unknown templates) and again per delivery
//! attempt, because templates may be edited while an email sits in the queue.

use mailgate_entities::email_templates;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::errors::DeliveryError;

/// A rendered email ready for the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

pub struct TemplateService {
    db: Arc<DatabaseConnection>,
}

impl TemplateService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a template by name: the tenant's own row wins over the global one
    pub async fn find(
        &self,
        tenant_id: Option<i32>,
        name: &str,
    ) -> Result<Option<email_templates::Model>, DeliveryError> {
        if let Some(tenant_id) = tenant_id {
            let tenant_template = email_templates::Entity::find()
                .filter(email_templates::Column::TenantId.eq(tenant_id))
                .filter(email_templates::Column::Name.eq(name))
                .one(self.db.as_ref())
                .await?;

            if tenant_template.is_some() {
                return Ok(tenant_template);
            }
        }

        let global = email_templates::Entity::find()
            .filter(Condition::all().add(email_templates::Column::TenantId.is_null()))
            .filter(email_templates::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await?;

        Ok(global)
    }

    /// Render a named template with the given data map
    pub async fn render(
        &self,
        tenant_id: Option<i32>,
        name: &str,
        data: &Map<String, Value>,
    ) -> Result<RenderedEmail, DeliveryError> {
        let template = self
            .find(tenant_id, name)
            .await?
            .ok_or_else(|| DeliveryError::TemplateNotFound(name.to_string()))?;

        Ok(RenderedEmail {
            subject: mailgate_core::templates::render(&template.subject, data),
            html: mailgate_core::templates::render(&template.html_body, data),
            text: template
                .text_body
                .as_deref()
                .map(|text| mailgate_core::templates::render(text, data)),
        })
    }
}
