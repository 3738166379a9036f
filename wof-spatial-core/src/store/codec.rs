//! Row codec: SQL statements for each engine operation and the mapping
//! between [`StoreRow`] values and [`StoredRecord`]s.
//!
//! Every statement targets the `whosonfirst` table and uses numbered
//! parameters. The geometry predicate is always `?1`; the placetype and flag
//! filters follow as `?2`..`?4`.

use super::{RowError, SqlValue, Statement, StoreRow};
use crate::{IntersectsQuery, Partition, RecordError, RecordParts, StoredRecord, UpsertShape};

/// Name of the table holding indexed features.
pub const TABLE: &str = "whosonfirst";

/// Columns returned by every record select, in decode order.
pub const RECORD_COLUMNS: [&str; 10] = [
    "id",
    "parent_id",
    "placetype_id",
    "is_superseded",
    "is_deprecated",
    "meta",
    "geom_hash",
    "lastmod",
    "geom",
    "centroid",
];

/// Count of matching records carrying a geometry.
pub const COUNT_GEOMETRY_SQL: &str = "SELECT COUNT(id) FROM whosonfirst \
     WHERE geom IS NOT NULL AND st_intersects(geom, ?1) \
     AND placetype_id = ?2 AND is_superseded = ?3 AND is_deprecated = ?4";

/// Count of matching records represented only by a centroid.
pub const COUNT_CENTROID_SQL: &str = "SELECT COUNT(id) FROM whosonfirst \
     WHERE geom IS NULL AND st_intersects(centroid, ?1) \
     AND placetype_id = ?2 AND is_superseded = ?3 AND is_deprecated = ?4";

/// One page of matching records carrying a geometry.
pub const PAGE_GEOMETRY_SQL: &str = "SELECT id, parent_id, placetype_id, is_superseded, \
     is_deprecated, meta, geom_hash, lastmod, geom, centroid FROM whosonfirst \
     WHERE geom IS NOT NULL AND st_intersects(geom, ?1) \
     AND placetype_id = ?2 AND is_superseded = ?3 AND is_deprecated = ?4 \
     ORDER BY id LIMIT ?5 OFFSET ?6";

/// One page of matching records represented only by a centroid.
pub const PAGE_CENTROID_SQL: &str = "SELECT id, parent_id, placetype_id, is_superseded, \
     is_deprecated, meta, geom_hash, lastmod, geom, centroid FROM whosonfirst \
     WHERE geom IS NULL AND st_intersects(centroid, ?1) \
     AND placetype_id = ?2 AND is_superseded = ?3 AND is_deprecated = ?4 \
     ORDER BY id LIMIT ?5 OFFSET ?6";

/// A single record by id.
pub const SELECT_BY_ID_SQL: &str = "SELECT id, parent_id, placetype_id, is_superseded, \
     is_deprecated, meta, geom_hash, lastmod, geom, centroid FROM whosonfirst WHERE id = ?1";

/// Upsert writing both spatial columns.
pub const UPSERT_GEOMETRY_AND_CENTROID_SQL: &str = "INSERT INTO whosonfirst \
     (id, parent_id, placetype_id, is_superseded, is_deprecated, meta, geom_hash, lastmod, geom, centroid) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
     ON CONFLICT(id) DO UPDATE SET parent_id = excluded.parent_id, \
     placetype_id = excluded.placetype_id, is_superseded = excluded.is_superseded, \
     is_deprecated = excluded.is_deprecated, meta = excluded.meta, \
     geom_hash = excluded.geom_hash, lastmod = excluded.lastmod, \
     geom = excluded.geom, centroid = excluded.centroid";

/// Upsert writing the geometry and clearing the centroid.
pub const UPSERT_GEOMETRY_SQL: &str = "INSERT INTO whosonfirst \
     (id, parent_id, placetype_id, is_superseded, is_deprecated, meta, geom_hash, lastmod, geom) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
     ON CONFLICT(id) DO UPDATE SET parent_id = excluded.parent_id, \
     placetype_id = excluded.placetype_id, is_superseded = excluded.is_superseded, \
     is_deprecated = excluded.is_deprecated, meta = excluded.meta, \
     geom_hash = excluded.geom_hash, lastmod = excluded.lastmod, \
     geom = excluded.geom, centroid = NULL";

/// Upsert writing the centroid and clearing the geometry.
pub const UPSERT_CENTROID_SQL: &str = "INSERT INTO whosonfirst \
     (id, parent_id, placetype_id, is_superseded, is_deprecated, meta, geom_hash, lastmod, centroid) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
     ON CONFLICT(id) DO UPDATE SET parent_id = excluded.parent_id, \
     placetype_id = excluded.placetype_id, is_superseded = excluded.is_superseded, \
     is_deprecated = excluded.is_deprecated, meta = excluded.meta, \
     geom_hash = excluded.geom_hash, lastmod = excluded.lastmod, \
     geom = NULL, centroid = excluded.centroid";

impl Partition {
    /// SQL counting this partition's matches.
    #[must_use]
    pub const fn count_sql(self) -> &'static str {
        match self {
            Self::Geometry => COUNT_GEOMETRY_SQL,
            Self::CentroidOnly => COUNT_CENTROID_SQL,
        }
    }

    /// SQL selecting one page of this partition's matches.
    #[must_use]
    pub const fn page_sql(self) -> &'static str {
        match self {
            Self::Geometry => PAGE_GEOMETRY_SQL,
            Self::CentroidOnly => PAGE_CENTROID_SQL,
        }
    }
}

impl UpsertShape {
    /// SQL for this upsert shape.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::GeometryAndCentroid => UPSERT_GEOMETRY_AND_CENTROID_SQL,
            Self::GeometryOnly => UPSERT_GEOMETRY_SQL,
            Self::CentroidOnly => UPSERT_CENTROID_SQL,
        }
    }
}

fn filter_params(query: &IntersectsQuery) -> Vec<SqlValue> {
    vec![
        SqlValue::from(query.geometry()),
        SqlValue::from(query.placetype_id()),
        SqlValue::from(query.is_superseded()),
        SqlValue::from(query.is_deprecated()),
    ]
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Statement counting `partition` matches for `query`.
#[must_use]
pub fn count_statement(partition: Partition, query: &IntersectsQuery) -> Statement {
    Statement::new(partition.count_sql(), filter_params(query))
}

/// Statement fetching the page of `partition` matches starting at `offset`.
#[must_use]
pub fn page_statement(partition: Partition, query: &IntersectsQuery, offset: u64) -> Statement {
    let mut params = filter_params(query);
    params.push(SqlValue::Integer(clamp_to_i64(query.page_size().get())));
    params.push(SqlValue::Integer(clamp_to_i64(offset)));
    Statement::new(partition.page_sql(), params)
}

/// Statement selecting a single record by id.
#[must_use]
pub fn select_by_id_statement(id: i64) -> Statement {
    Statement::new(SELECT_BY_ID_SQL, vec![SqlValue::Integer(id)])
}

/// Statement inserting or replacing `record`, keyed by id.
///
/// The statement shape follows [`StoredRecord::upsert_shape`]; the spatial
/// column that is not written is reset to `NULL` so a later write fully
/// replaces an earlier one.
#[must_use]
pub fn upsert_statement(record: &StoredRecord) -> Statement {
    let shape = record.upsert_shape();
    let mut params = vec![
        SqlValue::Integer(record.id()),
        SqlValue::Integer(record.parent_id()),
        SqlValue::Integer(record.placetype_id()),
        SqlValue::from(record.is_superseded()),
        SqlValue::from(record.is_deprecated()),
        SqlValue::from(record.meta()),
        SqlValue::from(record.geom_hash()),
        SqlValue::Integer(record.lastmod()),
    ];
    match shape {
        UpsertShape::GeometryAndCentroid => {
            params.push(SqlValue::from(record.geometry()));
            params.push(SqlValue::from(record.centroid()));
        }
        UpsertShape::GeometryOnly => params.push(SqlValue::from(record.geometry())),
        UpsertShape::CentroidOnly => params.push(SqlValue::from(record.centroid())),
    }
    Statement::new(shape.sql(), params)
}

fn spatial_value(text: &str) -> SqlValue {
    if text.is_empty() {
        SqlValue::Null
    } else {
        SqlValue::from(text)
    }
}

/// Encode `record` as a row in [`RECORD_COLUMNS`] order.
#[must_use]
pub fn encode_row(record: &StoredRecord) -> StoreRow {
    StoreRow::new(vec![
        SqlValue::Integer(record.id()),
        SqlValue::Integer(record.parent_id()),
        SqlValue::Integer(record.placetype_id()),
        SqlValue::from(record.is_superseded()),
        SqlValue::from(record.is_deprecated()),
        SqlValue::from(record.meta()),
        SqlValue::from(record.geom_hash()),
        SqlValue::Integer(record.lastmod()),
        spatial_value(record.geometry()),
        spatial_value(record.centroid()),
    ])
}

/// Decode a row selected with [`RECORD_COLUMNS`].
///
/// `NULL` spatial columns decode to empty strings.
pub fn decode_row(row: &StoreRow) -> Result<StoredRecord, RowError> {
    let parts = RecordParts {
        id: row.integer(0, "id")?,
        parent_id: row.integer(1, "parent_id")?,
        placetype_id: row.integer(2, "placetype_id")?,
        is_superseded: row.flag(3, "is_superseded")?,
        is_deprecated: row.flag(4, "is_deprecated")?,
        meta: row.text(5, "meta")?,
        geom_hash: row.text(6, "geom_hash")?,
        lastmod: row.integer(7, "lastmod")?,
        geometry: row.text(8, "geom")?,
        centroid: row.text(9, "centroid")?,
    };
    StoredRecord::new(parts).map_err(|err| match err {
        RecordError::MissingGeometry { id } => RowError::EmptySpatialColumns { id },
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use super::*;
    use rstest::{fixture, rstest};

    const POINT: &str = r#"{"type":"Point","coordinates":[1.0,2.0]}"#;
    const SQUARE: &str =
        r#"{"type":"MultiPolygon","coordinates":[[[[0,0],[1,0],[1,1],[0,1],[0,0]]]]}"#;

    #[fixture]
    fn query() -> IntersectsQuery {
        IntersectsQuery::new(SQUARE, 102_312_307)
            .expect("valid query")
            .with_deprecated(true)
            .with_page_size(NonZeroU64::new(25).expect("non-zero"))
    }

    fn record(geometry: &str, centroid: &str) -> StoredRecord {
        StoredRecord::new(RecordParts {
            id: 101_750_367,
            parent_id: 85_688_637,
            placetype_id: 102_312_317,
            is_superseded: false,
            is_deprecated: true,
            meta: r#"{"wof:name":"Alameda"}"#.into(),
            geom_hash: "abc".into(),
            lastmod: 1_700_000_000,
            geometry: geometry.into(),
            centroid: centroid.into(),
        })
        .expect("valid record")
    }

    #[rstest]
    fn count_binds_filters_in_order(query: IntersectsQuery) {
        let statement = count_statement(Partition::CentroidOnly, &query);
        assert_eq!(statement.sql(), COUNT_CENTROID_SQL);
        assert_eq!(
            statement.params(),
            &[
                SqlValue::from(SQUARE),
                SqlValue::Integer(102_312_307),
                SqlValue::Integer(0),
                SqlValue::Integer(1),
            ]
        );
    }

    #[rstest]
    fn page_appends_limit_and_offset(query: IntersectsQuery) {
        let statement = page_statement(Partition::Geometry, &query, 50);
        assert_eq!(statement.sql(), PAGE_GEOMETRY_SQL);
        assert_eq!(
            statement.params().get(4..),
            Some(&[SqlValue::Integer(25), SqlValue::Integer(50)][..])
        );
    }

    #[rstest]
    #[case(SQUARE, POINT, UPSERT_GEOMETRY_AND_CENTROID_SQL, 10)]
    #[case(SQUARE, "", UPSERT_GEOMETRY_SQL, 9)]
    #[case("", POINT, UPSERT_CENTROID_SQL, 9)]
    fn upsert_shape_selects_statement(
        #[case] geometry: &str,
        #[case] centroid: &str,
        #[case] sql: &str,
        #[case] arity: usize,
    ) {
        let statement = upsert_statement(&record(geometry, centroid));
        assert_eq!(statement.sql(), sql);
        assert_eq!(statement.params().len(), arity);
    }

    #[rstest]
    #[case(SQUARE, POINT)]
    #[case("", POINT)]
    #[case(SQUARE, "")]
    fn encoded_rows_decode_to_the_same_record(#[case] geometry: &str, #[case] centroid: &str) {
        let original = record(geometry, centroid);
        let decoded = decode_row(&encode_row(&original)).expect("row decodes");
        assert_eq!(decoded, original);
    }

    #[rstest]
    fn decode_rejects_rows_without_spatial_columns() {
        let mut values = encode_row(&record("", POINT)).values().to_vec();
        values.truncate(9);
        values.push(SqlValue::Null);
        let err = decode_row(&StoreRow::new(values)).expect_err("empty spatial columns");
        assert_eq!(err, RowError::EmptySpatialColumns { id: 101_750_367 });
    }

    #[rstest]
    fn decode_reports_short_rows() {
        let row = StoreRow::new(vec![SqlValue::Integer(1)]);
        assert_eq!(
            decode_row(&row),
            Err(RowError::MissingColumn {
                column: "parent_id",
                index: 1,
            })
        );
    }
}
