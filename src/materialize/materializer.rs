//! Turning cursor rows into typed values.

use std::any::{Any, TypeId};
use std::collections::HashSet;

use tracing::trace;

use crate::command::{Command, NavigationDescriptor, Shape};
use crate::error::{QuarryError, QuarryResult};
use crate::exec::Cursor;
use crate::metadata::{Entity, EntityMetadata};
use crate::value::Value;

use super::row::FromRow;
use super::table::DataTable;

type Hydrated = Box<dyn Any + Send>;

/// Reads the current result set of a cursor as the shape a [`Command`]
/// declares.
///
/// Entity rows are hydrated depth-first: root members come from the columns
/// bound to fields, then each included navigation is read from its column
/// range unless its split sentinel is NULL. Rows sharing a root key are
/// folded into one root when a collection was included.
pub struct Materializer<'c> {
    command: &'c Command,
}

impl<'c> Materializer<'c> {
    pub fn new(command: &'c Command) -> Self {
        Self { command }
    }

    /// Read the next raw row, or `None` once the result set is exhausted.
    pub fn fetch(&self, cursor: &mut dyn Cursor) -> QuarryResult<Option<Vec<Value>>> {
        let more = cursor.next_row().map_err(|e| self.provider_error(e))?;
        if !more {
            return Ok(None);
        }
        let row = (0..cursor.columns().len())
            .map(|i| cursor.get(i))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.provider_error(e))?;

        let expected = self.command.columns().len();
        if expected > 0 && row.len() != expected {
            return Err(QuarryError::mapping(
                format!("expected {expected} columns, the result has {}", row.len()),
                row,
            ));
        }
        Ok(Some(row))
    }

    /// Every row of the current result set as `T`.
    pub fn read_entities<T: Entity>(&self, cursor: &mut dyn Cursor) -> QuarryResult<Vec<T>> {
        let meta = self.entity_shape::<T>()?;
        let roots = self.hydrate_all(meta, cursor)?;
        roots
            .into_iter()
            .map(|(root, row)| {
                root.downcast::<T>()
                    .map(|t| *t)
                    .map_err(|_| QuarryError::mapping(format!("row is not a {}", meta.type_name), row))
            })
            .collect()
    }

    /// Every row of the current result set as a tuple or value list, hidden
    /// columns excluded.
    pub fn read_rows<R: FromRow>(&self, cursor: &mut dyn Cursor) -> QuarryResult<Vec<R>> {
        let mut out = Vec::new();
        while let Some(row) = self.fetch(cursor)? {
            trace!(row = out.len(), "materialized row");
            let visible = self.visible(&row);
            let value = R::from_row(&visible).map_err(|e| QuarryError::mapping(e.to_string(), row))?;
            out.push(value);
        }
        Ok(out)
    }

    /// The first column of the first row; NULL when there is no row.
    /// Remaining rows are drained.
    pub fn read_scalar(&self, cursor: &mut dyn Cursor) -> QuarryResult<Value> {
        let mut value = None;
        while let Some(mut row) = self.fetch(cursor)? {
            if value.is_none() {
                value = Some(if row.is_empty() { Value::Null } else { row.swap_remove(0) });
            }
        }
        Ok(value.unwrap_or(Value::Null))
    }

    /// The current result set as an untyped table.
    pub fn read_table(&self, cursor: &mut dyn Cursor) -> QuarryResult<DataTable> {
        let bindings = self.command.columns();
        let names = cursor.columns().to_vec();
        let columns = if bindings.is_empty() {
            names
        } else {
            bindings
                .iter()
                .filter(|b| !b.hidden)
                .map(|b| b.name.clone())
                .collect()
        };
        let mut table = DataTable::new(columns);
        while let Some(row) = self.fetch(cursor)? {
            trace!(row = table.len(), "materialized row");
            table.push(self.visible(&row));
        }
        Ok(table)
    }

    fn visible(&self, row: &[Value]) -> Vec<Value> {
        let bindings = self.command.columns();
        if bindings.is_empty() {
            return row.to_vec();
        }
        row.iter()
            .zip(bindings)
            .filter(|(_, b)| !b.hidden)
            .map(|(v, _)| v.clone())
            .collect()
    }

    fn entity_shape<T: Entity>(&self) -> QuarryResult<&'c EntityMetadata> {
        match self.command.shape() {
            Shape::Entity(meta) if meta.type_id == TypeId::of::<T>() => Ok(&**meta),
            Shape::Entity(meta) => Err(QuarryError::mapping(
                format!(
                    "the command yields {} rows, not {}",
                    meta.type_name,
                    std::any::type_name::<T>()
                ),
                Vec::new(),
            )),
            other => Err(QuarryError::mapping(
                format!("the command yields {other:?} rows, not entities"),
                Vec::new(),
            )),
        }
    }

    /// Hydrate every root of the result set, paired with its first row.
    fn hydrate_all(
        &self,
        meta: &EntityMetadata,
        cursor: &mut dyn Cursor,
    ) -> QuarryResult<Vec<(Hydrated, Vec<Value>)>> {
        let navs = self.command.navigations();
        let collections: Vec<usize> = navs
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none() && n.is_collection)
            .map(|(i, _)| i)
            .collect();
        let key_ordinals = self.key_ordinals(meta);

        let mut roots: Vec<(Hydrated, Vec<Value>)> = Vec::new();
        let mut current_key: Option<String> = None;
        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); collections.len()];
        let mut index = 0;

        while let Some(row) = self.fetch(cursor)? {
            trace!(row = index, "materialized row");
            index += 1;

            let key = (!collections.is_empty()).then(|| key_text(&row, &key_ordinals));
            let same_root = key.is_some() && key == current_key && !roots.is_empty();
            if !same_root {
                let root = self.hydrate_root(meta, &row)?;
                roots.push((root, row.clone()));
                current_key = key;
                seen.iter_mut().for_each(HashSet::clear);
            }

            let Some((root, _)) = roots.last_mut() else {
                continue;
            };
            for (slot, &nav_index) in collections.iter().enumerate() {
                let nav = &navs[nav_index];
                if row[nav.sentinel] == Value::Null {
                    continue;
                }
                let child_key = key_text(&row, &self.nav_key_ordinals(nav));
                if !seen[slot].insert(child_key) {
                    continue;
                }
                let child = self.hydrate_nav(nav_index, &row)?;
                self.attach(nav, root.as_mut(), child, &row)?;
            }
        }
        Ok(roots)
    }

    fn hydrate_root(&self, meta: &EntityMetadata, row: &[Value]) -> QuarryResult<Hydrated> {
        let mut entity = meta.create();
        for (ordinal, binding) in self.command.columns().iter().enumerate() {
            let Some(field) = &binding.field else {
                continue;
            };
            let column = meta.column(field).ok_or_else(|| {
                QuarryError::mapping(
                    format!("{} has no member {field}", meta.type_name),
                    row.to_vec(),
                )
            })?;
            column
                .write(entity.as_mut(), row[ordinal].clone())
                .map_err(|e| {
                    QuarryError::mapping(format!("{}.{field}: {e}", meta.type_name), row.to_vec())
                })?;
        }
        self.attach_references(None, entity.as_mut(), row)?;
        Ok(entity)
    }

    /// Instantiate the target of one navigation from its column range and
    /// attach its own reference navigations.
    fn hydrate_nav(&self, index: usize, row: &[Value]) -> QuarryResult<Hydrated> {
        let nav = &self.command.navigations()[index];
        let mut entity = nav.target.create();
        for (offset, column) in nav.target.columns.iter().enumerate().take(nav.field_count) {
            let value = row[nav.start + offset].clone();
            column.write(entity.as_mut(), value).map_err(|e| {
                QuarryError::mapping(format!("{}.{}: {e}", nav.path, column.field), row.to_vec())
            })?;
        }
        self.attach_references(Some(index), entity.as_mut(), row)?;
        Ok(entity)
    }

    /// Hydrate and attach the non-collection navigations owned by `parent`;
    /// a NULL sentinel leaves the member at its default.
    fn attach_references(
        &self,
        parent: Option<usize>,
        owner: &mut dyn Any,
        row: &[Value],
    ) -> QuarryResult<()> {
        for (index, nav) in self.command.navigations().iter().enumerate() {
            if nav.parent != parent || nav.is_collection {
                continue;
            }
            if row[nav.sentinel] == Value::Null {
                continue;
            }
            let child = self.hydrate_nav(index, row)?;
            self.attach(nav, owner, child, row)?;
        }
        Ok(())
    }

    fn attach(
        &self,
        nav: &NavigationDescriptor,
        owner: &mut dyn Any,
        child: Hydrated,
        row: &[Value],
    ) -> QuarryResult<()> {
        let link = nav.owner.link(&nav.member).ok_or_else(|| {
            QuarryError::mapping(
                format!("{} has no navigation {}", nav.owner.type_name, nav.member),
                row.to_vec(),
            )
        })?;
        link.attach(owner, child).map_err(|e| {
            QuarryError::mapping(
                format!("cannot attach {}.{}: {e}", nav.owner.type_name, nav.member),
                row.to_vec(),
            )
        })
    }

    fn key_ordinals(&self, meta: &EntityMetadata) -> Vec<usize> {
        let columns = self.command.columns();
        meta.key_columns()
            .filter_map(|key| {
                columns
                    .iter()
                    .position(|b| b.field.as_deref() == Some(key.field.as_str()))
            })
            .collect()
    }

    fn nav_key_ordinals(&self, nav: &NavigationDescriptor) -> Vec<usize> {
        let keys: Vec<usize> = nav
            .target
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key)
            .map(|(i, _)| nav.start + i)
            .collect();
        if keys.is_empty() {
            // keyless children are told apart by all their columns
            (nav.start..nav.start + nav.field_count).collect()
        } else {
            keys
        }
    }

    fn provider_error(&self, source: crate::exec::ProviderError) -> QuarryError {
        QuarryError::execution(self.command.clone(), source)
    }
}

fn key_text(row: &[Value], ordinals: &[usize]) -> String {
    let values: Vec<&Value> = ordinals.iter().filter_map(|&i| row.get(i)).collect();
    format!("{values:?}")
}
