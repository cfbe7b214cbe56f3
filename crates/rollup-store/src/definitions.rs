//! Definition repository
//!
//! Definitions are stored in their raw, namespace-qualified form. Order-by
//! children go to their own column and are left out of the payload, so a
//! loaded definition reports its order-bys as "not loaded" and the resolver
//! fetches them through `find_order_bys`.

use rollup_core::host::DefinitionSource;
use rollup_core::metadata::namespace::KEY_ORDER_BYS;
use rollup_core::metadata::{order_by_children, to_raw_definition, FieldNameMap, OrderByChildren, RawDefinition, RawOrderBy};
use rollup_core::model::RollupDefinition;
use rusqlite::OptionalExtension;

use crate::errors::{data_access, data_corrupt, from_rusqlite, Result};
use crate::host::SqliteHost;

type CoreResult<T> = rollup_core::errors::Result<T>;

/// Summary row for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRow {
    pub id: String,
    pub calc_item_type: String,
    pub parent_type: String,
    pub active: bool,
}

impl SqliteHost {
    /// Insert or replace a definition, returning its id
    ///
    /// Definitions without an id are stored under their fingerprint.
    pub fn save_definition(&mut self, def: &RollupDefinition, names: &FieldNameMap) -> Result<String> {
        let id = def.key();
        let def = def.clone().with_id(id.clone());

        let mut raw = to_raw_definition(&def, names);
        let order_bys: Vec<RawOrderBy> = match order_by_children(&raw, names) {
            OrderByChildren::Loaded(records) => records,
            OrderByChildren::NotLoaded => Vec::new(),
        };
        raw.remove(names.effective(KEY_ORDER_BYS));

        let payload = serde_json::Value::Object(raw).to_string();
        let order_bys_json = serde_json::to_string(&order_bys).map_err(rollup_core::errors::RollupError::from)?;
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "INSERT INTO definitions
                    (id, calc_item_type, parent_type, active, payload_json, order_bys_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    calc_item_type = excluded.calc_item_type,
                    parent_type = excluded.parent_type,
                    active = excluded.active,
                    payload_json = excluded.payload_json,
                    order_bys_json = excluded.order_bys_json,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    id,
                    def.calc_item_type,
                    def.parent_type,
                    def.active,
                    payload,
                    order_bys_json,
                    now
                ],
            )
            .map_err(from_rusqlite)?;
        tracing::debug!(definition = %id, "definition saved");
        Ok(id)
    }

    pub fn delete_definition(&mut self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM definitions WHERE id = ?1", [id])
            .map_err(from_rusqlite)?;
        Ok(n > 0)
    }

    pub fn list_definition_rows(&self) -> Result<Vec<DefinitionRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, calc_item_type, parent_type, active FROM definitions ORDER BY calc_item_type, id")
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DefinitionRow {
                    id: row.get(0)?,
                    calc_item_type: row.get(1)?,
                    parent_type: row.get(2)?,
                    active: row.get(3)?,
                })
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(rows)
    }
}

impl DefinitionSource for SqliteHost {
    fn load_definitions(&self) -> CoreResult<Vec<RawDefinition>> {
        let op = "load_definitions";
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM definitions ORDER BY created_at, id")
            .map_err(data_access(op))?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(data_access(op))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(data_access(op))?;
        payloads
            .iter()
            .map(|p| serde_json::from_str::<RawDefinition>(p).map_err(data_corrupt(op)))
            .collect()
    }

    fn find_order_bys(&self, definition_id: &str) -> CoreResult<Vec<RawOrderBy>> {
        let op = "find_order_bys";
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT order_bys_json FROM definitions WHERE id = ?1",
                [definition_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(data_access(op))?;
        match json {
            Some(j) => serde_json::from_str(&j).map_err(data_corrupt(op)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_core::model::{Operation, OrderBy};

    #[test]
    fn test_saved_definition_loads_with_order_bys_not_loaded() {
        let mut host = SqliteHost::open_in_memory().unwrap();
        let names = FieldNameMap::new("");
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "FirstContact", Operation::First)
            .with_id("def-first")
            .with_order_by(OrderBy::asc("FirstName"));
        host.save_definition(&def, &names).unwrap();

        let raws = host.load_definitions().unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(order_by_children(&raws[0], &names), OrderByChildren::NotLoaded);
        assert_eq!(host.find_order_bys("def-first").unwrap().len(), 1);
    }

    #[test]
    fn test_definition_without_id_is_keyed_by_fingerprint() {
        let mut host = SqliteHost::open_in_memory().unwrap();
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Id", "Total", Operation::Count);
        let id = host.save_definition(&def, &FieldNameMap::new("")).unwrap();
        assert_eq!(id, def.key());
        assert!(id.starts_with("fp:"));
        assert_eq!(host.list_definition_rows().unwrap()[0].id, id);
        assert!(host.delete_definition(&id).unwrap());
    }
}
