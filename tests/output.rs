use camino::Utf8PathBuf;

use owid_cy::domain::EntityKey;
use owid_cy::output::{write_citations, write_table};
use owid_cy::table::{Table, Value};

#[test]
fn writes_table_to_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("out").join("agg.csv")).unwrap();

    let mut left = Table::new(vec!["gdp".to_string()]);
    left.insert(EntityKey::new("USA", 2020), vec![Some(Value::number(5.0))]);
    let mut right = Table::new(vec!["status".to_string()]);
    right.insert(
        EntityKey::new("FRA", 2020),
        vec![Some(Value::Text("Has, tested".to_string()))],
    );
    let table = left.outer_join(right).unwrap();

    write_table(&table, Some(path.as_path())).unwrap();
    let written = std::fs::read_to_string(path.as_std_path()).unwrap();
    assert_eq!(
        written,
        "Code,Year,gdp,status\nFRA,2020,,\"Has, tested\"\nUSA,2020,5,\n"
    );
}

#[test]
fn overwrites_existing_citation_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("cite.txt")).unwrap();
    std::fs::write(path.as_std_path(), "stale\n").unwrap();

    let citations = vec!["First".to_string(), "Second".to_string()];
    write_citations(&citations, Some(path.as_path())).unwrap();
    let written = std::fs::read_to_string(path.as_std_path()).unwrap();
    assert_eq!(written, "First\nSecond\n");
}
