//! Row assembly
//!
//! Expands each stats record into one row per calendar day of its window.
//! Every column gets a resolver up front, chosen by precedence:
//!
//! 1. identifier columns take the record id (or the denormalized parent id)
//! 2. `date` takes the day
//! 3. name and description columns take the entity field
//! 4. anything else is a metric lookup

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::warn;

use super::value::coerce;
use crate::extract::window::midnight;
use crate::schema::{ColumnSpec, ColumnType, ColumnValue, Row};
use crate::{Entity, EntityType, StatsRecord};

const IDENTIFIER_COLUMNS: [&str; 7] = [
    "id",
    "account_id",
    "campaign_id",
    "line_item_id",
    "promoted_tweet_id",
    "media_creative_id",
    "funding_instrument_id",
];

const NAME_COLUMNS: [&str; 4] = ["name", "account_name", "campaign_name", "line_item_name"];

/// Entities by id
#[derive(Debug, Default)]
pub struct EntityIndex<'a> {
    by_id: HashMap<&'a str, &'a Entity>,
}

impl<'a> EntityIndex<'a> {
    /// Index a fetched entity set; later duplicates shadow earlier ones
    pub fn new(entities: &'a [Entity]) -> Self {
        Self {
            by_id: entities.iter().map(|e| (e.id.as_str(), e)).collect(),
        }
    }

    /// Look up an entity
    pub fn get(&self, id: &str) -> Option<&'a Entity> {
        self.by_id.get(id).copied()
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdSource {
    Record,
    ParentCampaign,
    ParentLineItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityField {
    Name,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolver {
    Identifier(IdSource),
    Date,
    Entity(EntityField),
    Metric,
}

impl Resolver {
    fn for_column(name: &str, entity_type: EntityType) -> Self {
        if IDENTIFIER_COLUMNS.contains(&name) {
            let source = match (name, entity_type) {
                ("campaign_id", EntityType::LineItem) => IdSource::ParentCampaign,
                ("line_item_id", EntityType::PromotedTweet | EntityType::MediaCreative) => {
                    IdSource::ParentLineItem
                }
                _ => IdSource::Record,
            };
            return Resolver::Identifier(source);
        }
        if name == "date" {
            return Resolver::Date;
        }
        if NAME_COLUMNS.contains(&name) {
            return Resolver::Entity(EntityField::Name);
        }
        if name == "description" {
            return Resolver::Entity(EntityField::Description);
        }
        Resolver::Metric
    }
}

/// Projects stats records onto a column schema
pub struct RowAssembler<'a> {
    columns: &'a [ColumnSpec],
    resolvers: Vec<Resolver>,
    index: EntityIndex<'a>,
    timezone: Tz,
}

impl<'a> RowAssembler<'a> {
    /// Assembler for one run's entity set and schema
    pub fn new(
        entity_type: EntityType,
        entities: &'a [Entity],
        columns: &'a [ColumnSpec],
        timezone: Tz,
    ) -> Self {
        let resolvers = columns
            .iter()
            .map(|c| Resolver::for_column(&c.name, entity_type))
            .collect();

        Self {
            columns,
            resolvers,
            index: EntityIndex::new(entities),
            timezone,
        }
    }

    /// Lazily expand records into rows, one per day, in record order
    pub fn expand<'r>(&'r self, records: &'r [StatsRecord]) -> impl Iterator<Item = Row> + 'r {
        records.iter().flat_map(move |record| {
            let entity = self.index.get(&record.entity_id);
            if entity.is_none() {
                warn!(entity_id = %record.entity_id, "Stats record for an unknown entity");
            }
            record
                .days()
                .enumerate()
                .map(move |(day_index, day)| self.row(record, entity, day_index, day))
        })
    }

    fn row(
        &self,
        record: &StatsRecord,
        entity: Option<&Entity>,
        day_index: usize,
        day: NaiveDate,
    ) -> Row {
        self.columns
            .iter()
            .zip(&self.resolvers)
            .map(|(column, resolver)| match resolver {
                Resolver::Identifier(source) => {
                    let id = match source {
                        IdSource::Record => Some(&record.entity_id),
                        IdSource::ParentCampaign => record.campaign_id.as_ref(),
                        IdSource::ParentLineItem => record.line_item_id.as_ref(),
                    };
                    text_value(id.map(String::as_str), column)
                }
                Resolver::Date => self.date_value(day, column),
                Resolver::Entity(field) => {
                    let text = entity.and_then(|e| match field {
                        EntityField::Name => e.name.as_deref(),
                        EntityField::Description => e.description.as_deref(),
                    });
                    text_value(text, column)
                }
                Resolver::Metric => match record.metrics.get(&column.name) {
                    None => ColumnValue::Null,
                    Some(metric) if column.column_type == ColumnType::Json => {
                        ColumnValue::Json(metric.to_json())
                    }
                    Some(metric) => metric
                        .at(day_index)
                        .map_or(ColumnValue::Null, |value| coerce(value, column)),
                },
            })
            .collect()
    }

    fn date_value(&self, day: NaiveDate, column: &ColumnSpec) -> ColumnValue {
        match column.column_type {
            ColumnType::String => {
                let mut rendered = String::new();
                match &column.format {
                    Some(format) if write!(rendered, "{}", day.format(format)).is_ok() => {}
                    _ => rendered = day.to_string(),
                }
                ColumnValue::String(rendered)
            }
            ColumnType::Json => ColumnValue::Json(Value::String(day.to_string())),
            ColumnType::Timestamp => midnight(day, self.timezone)
                .map(|ts| ColumnValue::Timestamp(ts.with_timezone(&Utc)))
                .unwrap_or(ColumnValue::Null),
            ColumnType::Long => midnight(day, self.timezone)
                .map(|ts| ColumnValue::Long(ts.timestamp()))
                .unwrap_or(ColumnValue::Null),
            ColumnType::Boolean => ColumnValue::Null,
        }
    }
}

fn text_value(text: Option<&str>, column: &ColumnSpec) -> ColumnValue {
    match text {
        Some(text) => coerce(&Value::String(text.to_string()), column),
        None => ColumnValue::Null,
    }
}
