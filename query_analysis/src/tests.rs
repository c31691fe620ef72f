//! End-to-end analysis tests over parsed statements.

use crate::{analyze, Error};
use chunk_meta::{CssAccess, MemKvInterface};
use chunk_spec::{build_chunk_query_specs, ChunkSpec};
use std::sync::Arc;

fn test_css() -> CssAccess {
    let kv = MemKvInterface::from_pairs([
        (
            "/DBS/LSST/TABLES/Object/schema",
            "objectId,objectIdObjTest,ra_PS,decl_PS,ra_Test,pm_declErr,chunkId,bMagF,bMagF2",
        ),
        ("/DBS/LSST/TABLES/Object/partitioning", "1"),
        ("/DBS/LSST/TABLES/Object/partitioning/subChunks", "1"),
        ("/DBS/LSST/TABLES/Source/schema", "objectId,flux"),
        ("/DBS/LSST/TABLES/Source/partitioning", "1"),
        ("/DBS/LSST/TABLES/Filter/schema", "filterId,name"),
        ("/DBS/LSST/partitioning/dirTable", "Object"),
        ("/DBS/LSST/partitioning/dirColName", "objectIdObjTest"),
        ("/DBS/LSST/partitioning/nStripes", "60"),
        ("/DBS/LSST/partitioning/nSubStripes", "12"),
        ("/DBS/LSST/CHUNKS/100/worker", "w1"),
    ]);
    CssAccess::new(Arc::new(kv))
}

fn analyze_sql(sql: &str) -> crate::Result<crate::AnalyzedQuery> {
    test_helpers::maybe_start_logging();
    let stmt = sql_frontend::parse_select(sql).expect("parse");
    analyze(stmt, test_css(), "LSST")
}

#[test]
fn count_in_query() {
    let analyzed = analyze_sql(
        "SELECT COUNT(*) AS N FROM Source WHERE objectId IN (386950783579546, 386942193651348)",
    )
    .unwrap();
    let plan = &analyzed.plan;

    assert_eq!(plan.parallel.len(), 1);
    assert_eq!(
        plan.parallel[0].generate(),
        "SELECT COUNT(*) AS QS1_COUNT FROM LSST.Source_{chunk} AS `LSST.Source` \
         WHERE `LSST.Source`.objectId IN (386950783579546,386942193651348)"
    );
    assert_eq!(
        plan.merge.as_ref().unwrap().generate(),
        "SELECT SUM(QS1_COUNT) AS N"
    );
    assert_eq!(plan.dominant_db, "LSST");
    assert!(plan.mapping.uses_chunks);
    assert!(!plan.mapping.uses_sub_chunks);
    assert!(analyzed.context.has_chunks);
    assert!(!analyzed.context.has_sub_chunks);

    // chunk materialization of the parallel template
    let specs = build_chunk_query_specs(
        "LSST",
        &[plan.parallel[0].generate()],
        &plan.mapping,
        &[ChunkSpec::simple(6630)],
    );
    assert_eq!(
        specs[0].queries,
        vec![
            "SELECT COUNT(*) AS QS1_COUNT FROM LSST.Source_6630 AS `LSST.Source` \
             WHERE `LSST.Source`.objectId IN (386950783579546,386942193651348)"
        ]
    );
}

#[test]
fn avg_split() {
    let analyzed =
        analyze_sql("SELECT chunkId, avg(bMagF2) bmf2 FROM LSST.Object WHERE bMagF > 20.0")
            .unwrap();
    let plan = &analyzed.plan;
    assert_eq!(
        plan.parallel[0].generate(),
        "SELECT `LSST.Object`.chunkId AS chunkId, \
         COUNT(`LSST.Object`.bMagF2) AS QS1_COUNT, \
         SUM(`LSST.Object`.bMagF2) AS QS2_SUM \
         FROM LSST.Object_{chunk} AS `LSST.Object` \
         WHERE `LSST.Object`.bMagF > 20.0"
    );
    assert_eq!(
        plan.merge.as_ref().unwrap().generate(),
        "SELECT chunkId, SUM(QS2_SUM) / SUM(QS1_COUNT) AS bmf2"
    );
}

#[test]
fn aggregate_with_group_by() {
    let analyzed = analyze_sql(
        "select sum(pm_declErr), chunkId, avg(bMagF2) bmf2 \
         from LSST.Object where bMagF > 20.0 GROUP BY chunkId",
    )
    .unwrap();
    let plan = &analyzed.plan;
    assert_eq!(
        plan.parallel[0].generate(),
        "SELECT sum(`LSST.Object`.pm_declErr) AS QS1_SUM, \
         `LSST.Object`.chunkId AS chunkId, \
         COUNT(`LSST.Object`.bMagF2) AS QS2_COUNT, \
         SUM(`LSST.Object`.bMagF2) AS QS3_SUM \
         FROM LSST.Object_{chunk} AS `LSST.Object` \
         WHERE `LSST.Object`.bMagF > 20.0 \
         GROUP BY chunkId"
    );
    assert_eq!(
        plan.merge.as_ref().unwrap().generate(),
        "SELECT SUM(QS1_SUM) AS `sum(pm_declErr)`, chunkId, \
         SUM(QS3_SUM) / SUM(QS2_COUNT) AS bmf2 \
         GROUP BY chunkId"
    );
}

#[test]
fn duplicate_select_names_rejected() {
    let err =
        analyze_sql("SELECT chunkId AS f1, pm_declErr AS f1 FROM LSST.Object GROUP BY chunkId")
            .unwrap_err();
    match err {
        Error::DuplicateSelectExpr { name, positions } => {
            assert_eq!(name, "f1");
            assert_eq!(positions, " 1 2");
        }
        other => panic!("expected DuplicateSelectExpr, got {:?}", other),
    }
}

#[test]
fn duplicate_detection_is_case_insensitive() {
    let err = analyze_sql("SELECT chunkId, CHUNKID FROM LSST.Object").unwrap_err();
    match err {
        Error::DuplicateSelectExpr { name, positions } => {
            assert_eq!(name, "chunkid");
            assert_eq!(positions, " 1 2");
        }
        other => panic!("expected DuplicateSelectExpr, got {:?}", other),
    }
}

#[test]
fn duplicate_qualified_names_rejected() {
    let err = analyze_sql(
        "SELECT o1.objectId, o2.objectId FROM Object o1, Object o2 \
         WHERE o1.objectId <> o2.objectId",
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateSelectExpr { .. }));
}

#[test]
fn secondary_index_restrictor() {
    let analyzed =
        analyze_sql("SELECT * FROM Object WHERE objectIdObjTest IN (2,3145,9999)").unwrap();
    assert_eq!(analyzed.context.dominant_db, "LSST");
    let restrictors = &analyzed.context.restrictors;
    assert_eq!(restrictors.len(), 1);
    assert_eq!(restrictors[0].name, "sIndex");
    assert_eq!(
        restrictors[0].params,
        vec!["LSST", "Object", "objectIdObjTest", "2", "3145", "9999"]
    );
}

#[test]
fn equality_on_director_key_restricts() {
    let analyzed = analyze_sql("SELECT ra_PS FROM Object WHERE objectIdObjTest = 42").unwrap();
    assert_eq!(analyzed.context.restrictors.len(), 1);
    assert_eq!(
        analyzed.context.restrictors[0].params,
        vec!["LSST", "Object", "objectIdObjTest", "42"]
    );
}

#[test]
fn non_director_in_is_not_a_restrictor() {
    let analyzed =
        analyze_sql("SELECT COUNT(*) AS n FROM Source WHERE objectId IN (1,2)").unwrap();
    assert!(analyzed.context.restrictors.is_empty());
}

#[test]
fn alias_patching_covers_all_clauses() {
    let analyzed = analyze_sql(
        "SELECT pm_declErr FROM LSST.Object WHERE bMagF > 20.0 \
         GROUP BY pm_declErr ORDER BY pm_declErr",
    )
    .unwrap();
    let sql = analyzed.plan.parallel[0].generate();
    // every column reference in the parallel statement goes through the
    // table alias
    assert!(sql.contains("`LSST.Object`.pm_declErr AS pm_declErr"));
    assert!(sql.contains("WHERE `LSST.Object`.bMagF > 20.0"));
    assert!(sql.contains("GROUP BY pm_declErr"));
    assert_eq!(analyzed.proxy_order_by, "ORDER BY pm_declErr");
}

#[test]
fn unchunked_table_needs_no_mapping() {
    let analyzed = analyze_sql("SELECT name FROM Filter").unwrap();
    assert!(!analyzed.plan.mapping.uses_chunks);
    assert!(!analyzed.context.has_chunks);
    assert!(analyzed.plan.merge.is_none());
    assert_eq!(
        analyzed.plan.parallel[0].generate(),
        "SELECT `LSST.Filter`.name AS name FROM LSST.Filter AS `LSST.Filter`"
    );
}

#[test]
fn self_join_expands_to_overlap() {
    let analyzed = analyze_sql(
        "SELECT o1.objectId AS oid1, o2.objectId AS oid2 FROM Object o1, Object o2 \
         WHERE o1.ra_PS = o2.ra_PS",
    )
    .unwrap();
    let plan = &analyzed.plan;
    assert!(plan.mapping.uses_chunks);
    assert!(plan.mapping.uses_sub_chunks);
    assert!(plan.mapping.uses_overlap);
    assert!(analyzed.context.has_sub_chunks);
    assert_eq!(plan.parallel.len(), 2);
    assert_eq!(
        plan.parallel[0].generate(),
        "SELECT o1.objectId AS oid1, o2.objectId AS oid2 \
         FROM LSST.Object_{chunk}_{subChunk} AS o1, LSST.Object_{chunk}_{subChunk} AS o2 \
         WHERE o1.ra_PS = o2.ra_PS"
    );
    assert_eq!(
        plan.parallel[1].generate(),
        "SELECT o1.objectId AS oid1, o2.objectId AS oid2 \
         FROM LSST.Object_{chunk}_{subChunk} AS o1, \
         LSST.Object_{chunk}FullOverlap_{subChunk} AS o2 \
         WHERE o1.ra_PS = o2.ra_PS"
    );
}

#[test]
fn limit_applies_to_both_sides() {
    let analyzed = analyze_sql("SELECT ra_PS FROM Object ORDER BY ra_PS LIMIT 5").unwrap();
    let plan = &analyzed.plan;
    // top-k: parallel keeps ORDER BY + LIMIT
    assert_eq!(plan.parallel[0].limit(), Some(5));
    assert!(plan.parallel[0].order_by().is_some());
    assert_eq!(plan.merge.as_ref().unwrap().limit(), Some(5));
    assert!(plan.merge.as_ref().unwrap().order_by().is_none());
    assert_eq!(analyzed.proxy_order_by, "ORDER BY ra_PS");
}

#[test]
fn group_by_drops_parallel_limit() {
    let analyzed = analyze_sql(
        "SELECT chunkId, COUNT(*) AS n FROM Object GROUP BY chunkId LIMIT 7",
    )
    .unwrap();
    let plan = &analyzed.plan;
    assert_eq!(plan.parallel[0].limit(), None);
    assert_eq!(plan.merge.as_ref().unwrap().limit(), Some(7));
}

#[test]
fn negative_limit_clamps_to_zero() {
    let analyzed = analyze_sql("SELECT ra_PS FROM Object LIMIT -3").unwrap();
    assert_eq!(analyzed.plan.parallel[0].limit(), Some(0));
    assert_eq!(analyzed.plan.merge.as_ref().unwrap().limit(), Some(0));
}

#[test]
fn preflight_is_unchunked_limit_zero() {
    let analyzed = analyze_sql("SELECT chunkId FROM Object WHERE bMagF > 20.0").unwrap();
    assert_eq!(
        analyzed.plan.preflight.generate(),
        "SELECT `LSST.Object`.chunkId AS chunkId FROM LSST.Object AS `LSST.Object` \
         WHERE `LSST.Object`.bMagF > 20.0 LIMIT 0"
    );
}

#[test]
fn distinct_forces_merge() {
    let analyzed = analyze_sql("SELECT DISTINCT filterId FROM Filter").unwrap();
    let merge = analyzed.plan.merge.as_ref().unwrap();
    assert!(merge.distinct);
    assert_eq!(merge.generate(), "SELECT DISTINCT filterId");
}

#[test]
fn having_moves_to_merge() {
    let analyzed = analyze_sql(
        "SELECT chunkId, COUNT(*) AS n FROM Object GROUP BY chunkId HAVING COUNT(*) > 5",
    )
    .unwrap();
    let plan = &analyzed.plan;
    assert!(plan.parallel[0].having().is_none());
    let merge_sql = plan.merge.as_ref().unwrap().generate();
    assert!(
        merge_sql.contains("HAVING SUM(QS1_COUNT) > 5"),
        "{}",
        merge_sql
    );
}

#[test]
fn unknown_database_is_missing_metadata() {
    let err = analyze_sql("SELECT a FROM NoSuchDb.T").unwrap_err();
    assert!(matches!(err, Error::MissingMetadata { .. }));
}

#[test]
fn group_by_non_output_column_rejected() {
    let err = analyze_sql("SELECT chunkId AS k FROM Object GROUP BY ra_Test").unwrap_err();
    assert!(matches!(err, Error::UnsupportedFeature { .. }), "{:?}", err);
}
