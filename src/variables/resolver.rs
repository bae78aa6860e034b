//! Turns configured variables into secret values.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::errors::{BwStateError, Result};
use crate::vault::{Item, VaultClient};

use super::{ConfigVariable, ConfigVariables, VariableSource};

/// Pick the value a `field` selector names out of an item.
///
/// `favorite` yields the item id, not the favorite flag.  Anything that
/// is not a well-known selector is looked up as a custom field.
pub fn select_field(item: &Item, field: &str) -> Result<String> {
    let value = match field {
        "" | "password" => item.login.password(),
        "username" => item.login.username(),
        "totp" => item.login.totp(),
        "uri" => item
            .login
            .uris
            .first()
            .map(|u| u.uri.as_str())
            .unwrap_or_default(),
        "organization_id" => item.organization_id.as_deref().unwrap_or_default(),
        "folder_id" => item.folder_id.as_deref().unwrap_or_default(),
        "collection_id" => item
            .collection_ids
            .first()
            .map(String::as_str)
            .unwrap_or_default(),
        "name" => item.name.as_str(),
        "id" | "favorite" => item.id.as_str(),
        custom => item
            .field(custom)
            .map(|f| f.value())
            .ok_or_else(|| BwStateError::UnknownField(format!("'{custom}' on {item}")))?,
    };
    Ok(value.to_string())
}

/// Resolves variables against a vault.
#[derive(Clone)]
pub struct VariableResolver {
    client: Arc<dyn VaultClient>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl VariableResolver {
    pub fn new(client: Arc<dyn VaultClient>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            client,
            diagnostics,
        }
    }

    /// Resolve every variable.  The first failure aborts the batch and
    /// carries the label of the variable that failed.
    pub fn resolve(&self, variables: &ConfigVariables) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for variable in variables {
            let value = self.resolve_one(variable, variables)?;
            values.insert(variable.label.clone(), value);
        }
        Ok(values)
    }

    /// Resolve a single variable, following `ref`s within `variables`.
    pub fn resolve_one(
        &self,
        variable: &ConfigVariable,
        variables: &ConfigVariables,
    ) -> Result<String> {
        let mut chain = vec![variable.label.as_str()];
        self.resolve_chain(variable, variables, &mut chain)
            .map_err(|e| e.for_variable(&variable.label))
    }

    fn resolve_chain<'a>(
        &self,
        variable: &'a ConfigVariable,
        variables: &'a ConfigVariables,
        chain: &mut Vec<&'a str>,
    ) -> Result<String> {
        let item = match variable.source()? {
            VariableSource::Ref(target) => {
                if chain.contains(&target) {
                    chain.push(target);
                    return Err(BwStateError::CyclicReference(chain.join(" -> ")));
                }
                let next = variables
                    .lookup(target)
                    .ok_or_else(|| BwStateError::UnresolvableRef {
                        reference: target.to_string(),
                    })?;
                chain.push(target);
                return self.resolve_chain(next, variables, chain);
            }
            VariableSource::ItemId(id) => self.client.get_item(id)?,
            VariableSource::Query(query) => {
                if query.is_too_broad() {
                    self.diagnostics
                        .too_broad_query(&variable.label, &query.name);
                }
                self.client.find_item(&query)?
            }
        };
        select_field(&item, variable.field())
    }
}
