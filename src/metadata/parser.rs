//! EDMX metadata parsing
//!
//! Parses the `$metadata` document exposed by Business Central into a
//! nested entity/property structure and a flattened per-column row list.

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

/// Entity Data Model namespace. The document itself is wrapped in the EDMX
/// namespace (`http://docs.oasis-open.org/odata/ns/edmx`); everything this
/// parser reads lives in the EDM namespace below it.
const EDM_NS: &str = "http://docs.oasis-open.org/odata/ns/edm";

/// Fixed column names emitted for every flattened row.
pub const COL_ENDPOINT_NAME: &str = "API Endpoint Name";
pub const COL_COLUMN_NAME: &str = "Column Name";
pub const COL_DATA_TYPE: &str = "DataType";
pub const COL_NULLABLE: &str = "Nullable";
pub const COL_MAX_LENGTH: &str = "MaxLength";
pub const COL_SCALE: &str = "Scale";

/// Prefix for annotation-derived columns.
const ANNOTATION_COLUMN_PREFIX: &str = "Annotations.";

/// Metadata parsing errors
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("malformed metadata document: {0}")]
    Malformed(#[from] roxmltree::Error),
}

/// One column/field of an entity type.
///
/// Attribute values are kept verbatim as they appear in the document; an
/// absent attribute stays `None` rather than being coerced to a default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDescriptor {
    pub data_type: Option<String>,
    pub nullable: Option<String>,
    pub max_length: Option<String>,
    pub scale: Option<String>,
    /// Annotation term to resolved value, in document order. An annotation
    /// without a `Term` attribute is stored under the `None` key; repeated
    /// term-less annotations overwrite one another.
    pub annotations: IndexMap<Option<String>, Option<String>>,
}

/// One Business Central table/entity exposed via metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityType {
    /// Property name to descriptor, in document order.
    pub properties: IndexMap<String, PropertyDescriptor>,
}

/// One flattened output record per (entity, property) pair.
///
/// Always carries the six fixed columns; annotation columns are present only
/// for terms that exist on the source property, so different rows may carry
/// different key sets.
pub type FlatRow = IndexMap<String, Option<String>>;

/// Parsed `$metadata` document.
///
/// Owns the raw XML text, the nested entity structure, and the flattened
/// row list. Immutable after construction.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    raw: String,
    entities: IndexMap<String, EntityType>,
    rows: Vec<FlatRow>,
}

impl MetadataDocument {
    /// Parse an EDMX metadata document.
    ///
    /// Entity types are collected from anywhere in the document (schema
    /// containers may nest them at varying depth); matching is by namespace
    /// URI, so source prefixes are irrelevant. A duplicated entity name
    /// keeps its original position but takes the later element's properties.
    pub fn parse(xml: &str) -> Result<Self, MetadataError> {
        let doc = roxmltree::Document::parse(xml)?;

        let mut entities: IndexMap<String, EntityType> = IndexMap::new();

        for entity_node in doc
            .descendants()
            .filter(|node| node.has_tag_name((EDM_NS, "EntityType")))
        {
            let entity_name = entity_node.attribute("Name").unwrap_or_default();
            let mut entity = EntityType::default();

            for prop in entity_node
                .children()
                .filter(|node| node.has_tag_name((EDM_NS, "Property")))
            {
                let prop_name = prop.attribute("Name").unwrap_or_default();

                let mut annotations: IndexMap<Option<String>, Option<String>> = IndexMap::new();
                for ann in prop
                    .children()
                    .filter(|node| node.has_tag_name((EDM_NS, "Annotation")))
                {
                    let term = ann.attribute("Term").map(str::to_string);
                    let value = resolve_annotation_value(&ann);
                    annotations.insert(term, value);
                }

                entity.properties.insert(
                    prop_name.to_string(),
                    PropertyDescriptor {
                        data_type: prop.attribute("Type").map(str::to_string),
                        nullable: prop.attribute("Nullable").map(str::to_string),
                        max_length: prop.attribute("MaxLength").map(str::to_string),
                        scale: prop.attribute("Scale").map(str::to_string),
                        annotations,
                    },
                );
            }

            entities.insert(entity_name.to_string(), entity);
        }

        let rows = flatten(&entities);

        tracing::debug!(
            "Parsed metadata: {} entity types, {} flattened rows",
            entities.len(),
            rows.len()
        );

        Ok(Self {
            raw: xml.to_string(),
            entities,
            rows,
        })
    }

    /// Raw XML text the document was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Nested entity structure, in document order.
    pub fn entities(&self) -> &IndexMap<String, EntityType> {
        &self.entities
    }

    /// Flattened rows, one per (entity, property) pair, in document order.
    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    /// Union of all row keys in first-seen order.
    ///
    /// Useful when writing the rows to a tabular sink: rows are sparse, so
    /// the output schema is the union, with absent cells left empty.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: IndexSet<String> = IndexSet::new();
        for row in &self.rows {
            for key in row.keys() {
                columns.insert(key.clone());
            }
        }
        columns.into_iter().collect()
    }
}

/// Resolve an annotation element to its value.
///
/// Precedence: `EnumMember` child text, then the `String` attribute, then
/// the `Bool` attribute. An `EnumMember` child wins even when a `String`
/// attribute is also set, and yields `None` if the child has no text.
fn resolve_annotation_value(ann: &roxmltree::Node<'_, '_>) -> Option<String> {
    let enum_member = ann
        .children()
        .find(|node| node.has_tag_name((EDM_NS, "EnumMember")));

    if let Some(member) = enum_member {
        member.text().map(str::to_string)
    } else if let Some(text) = ann.attribute("String") {
        Some(text.to_string())
    } else {
        ann.attribute("Bool").map(str::to_string)
    }
}

/// Flatten the nested structure into one row per (entity, property) pair.
///
/// An entity with zero properties contributes zero rows, and a property
/// with zero annotations produces a row with only the six fixed columns.
fn flatten(entities: &IndexMap<String, EntityType>) -> Vec<FlatRow> {
    let mut rows = Vec::new();

    for (entity_name, entity) in entities {
        for (prop_name, descriptor) in &entity.properties {
            let mut row = FlatRow::new();
            row.insert(COL_ENDPOINT_NAME.to_string(), Some(entity_name.clone()));
            row.insert(COL_COLUMN_NAME.to_string(), Some(prop_name.clone()));
            row.insert(COL_DATA_TYPE.to_string(), descriptor.data_type.clone());
            row.insert(COL_NULLABLE.to_string(), descriptor.nullable.clone());
            row.insert(COL_MAX_LENGTH.to_string(), descriptor.max_length.clone());
            row.insert(COL_SCALE.to_string(), descriptor.scale.clone());

            for (term, value) in &descriptor.annotations {
                let column = match term {
                    Some(term) => format!("{}{}", ANNOTATION_COLUMN_PREFIX, term),
                    None => ANNOTATION_COLUMN_PREFIX.to_string(),
                };
                row.insert(column, value.clone());
            }

            rows.push(row);
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="NAV">
      <EntityType Name="Customer">
        <Key>
          <PropertyRef Name="No" />
        </Key>
        <Property Name="No" Type="Edm.String" Nullable="false" MaxLength="20">
          <Annotation Term="NAV.LabelId" String="Customer No." />
        </Property>
        <Property Name="Balance" Type="Edm.Decimal" Scale="2">
          <Annotation Term="NAV.AllowEditOnCreate" Bool="false" />
          <Annotation Term="NAV.FieldClass">
            <EnumMember>NAV.FieldClassType/FlowField</EnumMember>
          </Annotation>
        </Property>
        <Property Name="Blocked" Type="Edm.String" />
      </EntityType>
      <EntityType Name="EmptyEntity" />
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn test_row_count_matches_property_count() {
        let doc = MetadataDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.entities().len(), 2);
        // EmptyEntity has no properties and contributes no rows
        assert_eq!(doc.rows().len(), 3);
    }

    #[test]
    fn test_fixed_columns_and_sparsity() {
        let doc = MetadataDocument::parse(SAMPLE).unwrap();

        let no_row = &doc.rows()[0];
        assert_eq!(no_row[COL_ENDPOINT_NAME], Some("Customer".to_string()));
        assert_eq!(no_row[COL_COLUMN_NAME], Some("No".to_string()));
        assert_eq!(no_row[COL_DATA_TYPE], Some("Edm.String".to_string()));
        assert_eq!(no_row[COL_NULLABLE], Some("false".to_string()));
        assert_eq!(no_row[COL_MAX_LENGTH], Some("20".to_string()));
        assert_eq!(no_row[COL_SCALE], None);
        assert_eq!(
            no_row["Annotations.NAV.LabelId"],
            Some("Customer No.".to_string())
        );
        // Exactly the six fixed columns plus this property's one annotation
        assert_eq!(no_row.len(), 7);

        // A property without annotations carries only the fixed columns
        let blocked_row = &doc.rows()[2];
        assert_eq!(blocked_row.len(), 6);
        assert!(!blocked_row.keys().any(|k| k.starts_with("Annotations.")));
    }

    #[test]
    fn test_annotation_values() {
        let doc = MetadataDocument::parse(SAMPLE).unwrap();
        let balance = &doc.entities()["Customer"].properties["Balance"];

        assert_eq!(
            balance.annotations[&Some("NAV.AllowEditOnCreate".to_string())],
            Some("false".to_string())
        );
        assert_eq!(
            balance.annotations[&Some("NAV.FieldClass".to_string())],
            Some("NAV.FieldClassType/FlowField".to_string())
        );
    }

    #[test]
    fn test_enum_member_wins_over_string_attribute() {
        let xml = r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="T">
        <Property Name="P" Type="Edm.String">
          <Annotation Term="NAV.FieldClass" String="ignored">
            <EnumMember>NAV.FieldClassType/FlowFilter</EnumMember>
          </Annotation>
        </Property>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

        let doc = MetadataDocument::parse(xml).unwrap();
        let prop = &doc.entities()["T"].properties["P"];
        assert_eq!(
            prop.annotations[&Some("NAV.FieldClass".to_string())],
            Some("NAV.FieldClassType/FlowFilter".to_string())
        );
    }

    #[test]
    fn test_duplicate_entity_names_later_wins() {
        let xml = r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="Item">
        <Property Name="Old" Type="Edm.String" />
      </EntityType>
      <EntityType Name="Item">
        <Property Name="New" Type="Edm.Int32" />
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

        let doc = MetadataDocument::parse(xml).unwrap();
        assert_eq!(doc.entities().len(), 1);
        let item = &doc.entities()["Item"];
        assert!(item.properties.contains_key("New"));
        assert!(!item.properties.contains_key("Old"));
    }

    #[test]
    fn test_missing_term_is_kept_under_sentinel_key() {
        let xml = r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="T">
        <Property Name="P" Type="Edm.String">
          <Annotation String="first" />
          <Annotation String="second" />
        </Property>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

        let doc = MetadataDocument::parse(xml).unwrap();
        let prop = &doc.entities()["T"].properties["P"];
        // Both land on the no-term key; the later one overwrites
        assert_eq!(prop.annotations.len(), 1);
        assert_eq!(prop.annotations[&None], Some("second".to_string()));
        assert_eq!(doc.rows()[0]["Annotations."], Some("second".to_string()));
    }

    #[test]
    fn test_namespace_prefixes_are_irrelevant() {
        let xml = r#"<x:Edmx xmlns:x="http://docs.oasis-open.org/odata/ns/edmx">
  <x:DataServices>
    <m:Schema xmlns:m="http://docs.oasis-open.org/odata/ns/edm">
      <m:EntityType Name="Vendor">
        <m:Property Name="Name" Type="Edm.String" />
      </m:EntityType>
    </m:Schema>
  </x:DataServices>
</x:Edmx>"#;

        let doc = MetadataDocument::parse(xml).unwrap();
        assert!(doc.entities().contains_key("Vendor"));
        assert_eq!(doc.rows().len(), 1);
    }

    #[test]
    fn test_columns_is_union_in_first_seen_order() {
        let doc = MetadataDocument::parse(SAMPLE).unwrap();
        let columns = doc.columns();

        let fixed = [
            COL_ENDPOINT_NAME,
            COL_COLUMN_NAME,
            COL_DATA_TYPE,
            COL_NULLABLE,
            COL_MAX_LENGTH,
            COL_SCALE,
        ];
        assert_eq!(columns[..6], fixed);
        assert_eq!(columns.len(), 9);
        assert_eq!(columns[6], "Annotations.NAV.LabelId");
        assert_eq!(columns[7], "Annotations.NAV.AllowEditOnCreate");
        assert_eq!(columns[8], "Annotations.NAV.FieldClass");
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let result = MetadataDocument::parse("<edmx:Edmx");
        assert!(matches!(result, Err(MetadataError::Malformed(_))));
    }

    #[test]
    fn test_raw_text_is_preserved() {
        let doc = MetadataDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.raw(), SAMPLE);
    }
}
