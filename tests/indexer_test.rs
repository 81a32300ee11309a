use tempfile::TempDir;

use sedge::{Document, Indexer, Keyword, KvBackend, TermQuery};

fn doc(id: &str, words: &[&str], bits: u64) -> Document {
    let mut doc = Document::new(id).with_bits(bits);
    for word in words {
        doc = doc.with_keyword(Keyword::new("", *word));
    }
    doc
}

fn leaf(word: &str) -> TermQuery {
    TermQuery::keyword(&Keyword::new("", word))
}

fn ids(docs: Vec<Document>) -> Vec<String> {
    docs.into_iter().map(|d| d.id).collect()
}

fn seeded_indexer(dir: &TempDir) -> Indexer {
    let indexer = Indexer::open(64, KvBackend::Log, dir.path()).unwrap();
    assert_eq!(indexer.add_doc(doc("a", &["go", "rust"], 0)).unwrap(), 1);
    assert_eq!(indexer.add_doc(doc("b", &["go", "java"], 0)).unwrap(), 1);
    indexer
}

#[test]
fn test_basic_index_and_search() {
    let dir = TempDir::new().unwrap();
    let indexer = seeded_indexer(&dir);

    let hits = indexer.search(&leaf("go"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a", "b"]);
}

#[test]
fn test_conjunction() {
    let dir = TempDir::new().unwrap();
    let indexer = seeded_indexer(&dir);

    let query = leaf("go").and([leaf("rust")]);
    let hits = indexer.search(&query, 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a"]);
}

#[test]
fn test_disjunction() {
    let dir = TempDir::new().unwrap();
    let indexer = seeded_indexer(&dir);

    let query = leaf("rust").or([leaf("java")]);
    let hits = indexer.search(&query, 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a", "b"]);
}

#[test]
fn test_bitmask_filtering() {
    let dir = TempDir::new().unwrap();
    let indexer = seeded_indexer(&dir);
    indexer.add_doc(doc("c", &["go"], 0b1101)).unwrap();
    indexer.add_doc(doc("d", &["go"], 0b0001)).unwrap();

    // on=0b0100 knocks out a, b and d; off=0b0010 and or=[0b1000] keep c.
    let hits = indexer
        .search(&leaf("go"), 0b0100, 0b0010, &[0b1000])
        .unwrap();
    assert_eq!(ids(hits), vec!["c"]);
}

#[test]
fn test_replace_on_add() {
    let dir = TempDir::new().unwrap();
    let indexer = Indexer::open(64, KvBackend::Log, dir.path()).unwrap();

    indexer.add_doc(doc("a", &["go"], 0)).unwrap();
    indexer.add_doc(doc("a", &["python"], 0)).unwrap();

    assert!(indexer.search(&leaf("go"), 0, 0, &[]).unwrap().is_empty());
    let hits = indexer.search(&leaf("python"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a"]);
}

#[test]
fn test_delete_leaves_no_dangling_postings() {
    let dir = TempDir::new().unwrap();
    let indexer = seeded_indexer(&dir);

    assert_eq!(indexer.delete_doc("a").unwrap(), 1);
    assert_eq!(indexer.delete_doc("a").unwrap(), 0);

    assert!(indexer.search(&leaf("rust"), 0, 0, &[]).unwrap().is_empty());
    let hits = indexer.search(&leaf("go"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["b"]);
}

#[test]
fn test_results_are_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let indexer = Indexer::open(64, KvBackend::Log, dir.path()).unwrap();
    for id in ["m", "z", "a", "k"] {
        indexer.add_doc(doc(id, &["w"], 0)).unwrap();
    }
    let hits = indexer.search(&leaf("w"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["m", "z", "a", "k"]);
}

#[test]
fn test_reload_from_forward_store() {
    let dir = TempDir::new().unwrap();
    {
        let indexer = seeded_indexer(&dir);
        indexer.add_doc(doc("c", &["go"], 0b1101)).unwrap();
        indexer.delete_doc("b").unwrap();
        indexer.close().unwrap();
    }

    let indexer = Indexer::open(64, KvBackend::Log, dir.path()).unwrap();
    // Nothing searchable before the rebuild.
    assert!(indexer.search(&leaf("go"), 0, 0, &[]).unwrap().is_empty());

    assert_eq!(indexer.load_from_forward().unwrap(), 2);
    let hits = indexer.search(&leaf("go"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a", "c"]);

    // Fresh inserts must sort after everything reloaded.
    indexer.add_doc(doc("d", &["go"], 0)).unwrap();
    let hits = indexer.search(&leaf("go"), 0, 0, &[]).unwrap();
    assert_eq!(ids(hits), vec!["a", "c", "d"]);
}

#[test]
fn test_payload_survives_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let indexer = Indexer::open(64, KvBackend::Log, dir.path()).unwrap();

    let mut submitted = doc("with-payload", &["tagged"], 42);
    submitted.payload = vec![0, 159, 146, 150];
    indexer.add_doc(submitted.clone()).unwrap();

    let hits = indexer.search(&leaf("tagged"), 0, 0, &[]).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload, submitted.payload);
    assert_eq!(hits[0].bits_feature, 42);
}
