//! Randomized checks of named-parameter translation.

use managed_db::db::translator::{Translation, bind_named, substitute_literals, translate};
use managed_db::error::DbError;
use managed_db::models::{EngineKind, Params, QueryParam};
use managed_db::params;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

fn random_identifier(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(1..12);
    let tail: String = rng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    format!("p{}", tail.to_lowercase())
}

fn random_value(rng: &mut impl Rng) -> QueryParam {
    match rng.gen_range(0..4) {
        0 => QueryParam::Int(rng.gen_range(-1000..1000)),
        1 => QueryParam::Bool(rng.r#gen()),
        2 => QueryParam::Null,
        _ => QueryParam::String(random_identifier(rng)),
    }
}

/// Distinct random names with values.
fn random_params(rng: &mut impl Rng, count: usize) -> Vec<(String, QueryParam)> {
    let mut names: Vec<String> = Vec::new();
    while names.len() < count {
        let name = random_identifier(rng);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
        .into_iter()
        .map(|name| {
            let value = random_value(rng);
            (name, value)
        })
        .collect()
}

#[test]
fn test_bound_arguments_follow_placeholder_order() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let count = rng.gen_range(1..8);
        let pairs = random_params(&mut rng, count);
        let params: Params = pairs.iter().cloned().collect();

        // Reference every name once, in a shuffled order
        let mut order: Vec<&(String, QueryParam)> = pairs.iter().collect();
        order.shuffle(&mut rng);
        let conditions: Vec<String> = order
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("c{i} = :{name}"))
            .collect();
        let sql = format!("SELECT * FROM t WHERE {}", conditions.join(" AND "));

        let translation = bind_named(EngineKind::PostgreSQL, &sql, &params).unwrap();
        let expected_args: Vec<QueryParam> = order.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(translation.args(), expected_args.as_slice(), "{sql}");

        let expected_sql = format!(
            "SELECT * FROM t WHERE {}",
            (0..order.len())
                .map(|i| format!("c{i} = ${}", i + 1))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        assert_eq!(translation.sql(), expected_sql);

        let mysql = bind_named(EngineKind::MySQL, &sql, &params).unwrap();
        assert_eq!(mysql.sql().matches('?').count(), order.len());
        assert!(!mysql.sql().contains(':'));
    }
}

#[test]
fn test_repeated_placeholder_binds_each_occurrence() {
    let translation = bind_named(
        EngineKind::SQLServer,
        "SELECT * FROM t WHERE a = :v OR b = :v",
        &params! { "v" => 3 },
    )
    .unwrap();
    assert_eq!(translation.sql(), "SELECT * FROM t WHERE a = @p1 OR b = @p2");
    assert_eq!(translation.args(), &[QueryParam::Int(3), QueryParam::Int(3)]);
}

#[test]
fn test_missing_parameter_names_the_placeholder() {
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let name = random_identifier(&mut rng);
        let sql = format!("UPDATE t SET a = 1 WHERE id = :{name}");
        let err = bind_named(EngineKind::Oracle, &sql, &Params::new()).unwrap_err();
        assert!(
            matches!(err, DbError::Translation { ref placeholder, .. } if *placeholder == name),
            "{err}"
        );
    }
}

#[test]
fn test_quoted_text_is_never_rewritten() {
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let name = random_identifier(&mut rng);
        let sql = format!("SELECT ':{name}', \"x:{name}\" FROM t WHERE a = :{name} -- :{name}");
        let params: Params = [(name.clone(), QueryParam::Int(1))].into_iter().collect();
        let translation = bind_named(EngineKind::PostgreSQL, &sql, &params).unwrap();
        assert_eq!(
            translation.sql(),
            format!("SELECT ':{name}', \"x:{name}\" FROM t WHERE a = $1 -- :{name}")
        );
        assert_eq!(translation.args().len(), 1);
    }
}

#[test]
fn test_ddl_literal_path() {
    let translation = translate(
        EngineKind::PostgreSQL,
        "CREATE TABLE t (id INT DEFAULT :id)",
        &params! { "id" => 5 },
    )
    .unwrap();
    assert_eq!(
        translation,
        Translation::Literal {
            sql: "CREATE TABLE t (id INT DEFAULT 5)".to_string()
        }
    );
}

#[test]
fn test_dml_bound_path() {
    let translation = translate(
        EngineKind::PostgreSQL,
        "SELECT * FROM t WHERE id = :id",
        &params! { "id" => 5 },
    )
    .unwrap();
    assert_eq!(
        translation,
        Translation::Bound {
            sql: "SELECT * FROM t WHERE id = $1".to_string(),
            args: vec![QueryParam::Int(5)],
        }
    );
}

#[test]
fn test_ddl_prefix_keys_do_not_collide() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let short = random_identifier(&mut rng);
        let long = format!("{short}{}", random_identifier(&mut rng));
        let short_value = rng.gen_range(0..1000i64);
        let long_value = rng.gen_range(1000..2000i64);

        let mut params = Params::new();
        params.insert(short.clone(), QueryParam::Int(short_value));
        params.insert(long.clone(), QueryParam::Int(long_value));

        let sql = format!("CREATE TABLE t (a INT DEFAULT :{short}, b INT DEFAULT :{long})");
        assert_eq!(
            substitute_literals(&sql, &params),
            format!("CREATE TABLE t (a INT DEFAULT {short_value}, b INT DEFAULT {long_value})")
        );
    }
}

#[test]
fn test_ddl_literal_formats() {
    let sql = substitute_literals(
        "ALTER TABLE t ADD c TEXT DEFAULT :s, ADD f REAL DEFAULT :f, ADD b BOOL DEFAULT :b",
        &params! { "s" => "x", "f" => 1.5f64, "b" => true },
    );
    assert_eq!(
        sql,
        "ALTER TABLE t ADD c TEXT DEFAULT \"x\", ADD f REAL DEFAULT 1.500000, ADD b BOOL DEFAULT "
    );
}
