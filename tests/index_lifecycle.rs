//! Index lifecycle: build, commit, reopen, delete, optimize.

use std::sync::Arc;

use lucerna::directory::{Directory, FsDirectory, RamDirectory};
use lucerna::document::{Document, Field};
use lucerna::index::{Index, Term};
use lucerna::{SortField, WriterConfig};
use tempfile::TempDir;

fn doc(id: usize, title: &str, contents: &str) -> Document {
    Document::new()
        .with_field(Field::keyword("id", id.to_string()))
        .with_field(Field::text("title", title))
        .with_field(Field::un_stored("contents", contents))
}

fn sample_corpus() -> Vec<Document> {
    [
        ("Introduction", "welcome to the documentation"),
        ("Reporting Bugs", "reporting bugs helps everyone"),
        ("Submitting Patches", "submitting patches is appreciated"),
        ("Building", "build instructions and requirements"),
        ("Searching", "query syntax and searching tips"),
        ("Wishlists", "submitting wishlists and feature ideas"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (title, contents))| doc(i, title, contents))
    .collect()
}

#[test]
fn test_build_commit_reopen_on_disk() {
    let temp = TempDir::new().unwrap();

    {
        let mut index = Index::create(temp.path()).unwrap();
        for document in sample_corpus() {
            index.add_document(document).unwrap();
        }
        index.commit().unwrap();
        assert_eq!(index.num_docs(), 6);
    }

    let index = Index::open(temp.path()).unwrap();
    assert_eq!(index.num_docs(), 6);
    assert_eq!(index.count(), 6);
    assert!(!index.has_deletions());

    let hits = index.find("contents:submitting").unwrap();
    let ids: Vec<u32> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids.len(), 2);

    // Stored fields round-trip through the reopen.
    let fetched = index.document(hits[0].id).unwrap();
    assert!(fetched.field("title").is_some());
    assert!(fetched.field("contents").is_none());
}

#[test]
fn test_generation_monotonicity() {
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let mut index = Index::create_in(directory, true).unwrap();
    assert_eq!(index.generation(), 1);

    for (i, document) in sample_corpus().into_iter().enumerate() {
        let before = index.generation();
        index.add_document(document).unwrap();
        index.commit().unwrap();
        assert_eq!(index.generation(), before + 1, "commit {i}");
    }

    // A commit with nothing pending does not advance the generation.
    let generation = index.generation();
    index.commit().unwrap();
    assert_eq!(index.generation(), generation);
}

#[test]
fn test_id_stability_within_generation() {
    let temp = TempDir::new().unwrap();
    {
        let mut index = Index::create(temp.path()).unwrap();
        for document in sample_corpus() {
            index.add_document(document).unwrap();
        }
        index.commit().unwrap();
    }

    let first_open = Index::open(temp.path()).unwrap();
    let second_open = Index::open(temp.path()).unwrap();

    for query in ["contents:submitting", "contents:bugs", "title:searching"] {
        let first: Vec<u32> = first_open.find(query).unwrap().iter().map(|h| h.id).collect();
        let second: Vec<u32> = second_open.find(query).unwrap().iter().map(|h| h.id).collect();
        assert_eq!(first, second, "{query}");
    }
}

#[test]
fn test_deletion_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let mut index = Index::create(temp.path()).unwrap();
        for document in sample_corpus() {
            index.add_document(document).unwrap();
        }
        index.commit().unwrap();

        index.delete(2).unwrap();
        assert!(index.is_deleted(2).unwrap());
        index.commit().unwrap();
    }

    let index = Index::open(temp.path()).unwrap();
    assert!(index.is_deleted(2).unwrap());
    assert!(index.has_deletions());
    assert_eq!(index.num_docs(), index.count() - 1);

    // Deleted documents stop matching.
    let hits = index.find("contents:patches").unwrap();
    assert!(hits.iter().all(|h| h.id != 2));
}

#[test]
fn test_optimize_converges_to_single_segment() {
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let mut index = Index::create_in(directory.clone(), true)
        .unwrap()
        .with_writer_config(
            WriterConfig::default()
                .with_max_buffered_docs(2)
                .with_merge_factor(100),
        );

    for document in sample_corpus() {
        index.add_document(document).unwrap();
    }
    index.delete(1).unwrap();
    index.optimize().unwrap();

    assert_eq!(index.num_docs(), 5);
    assert_eq!(index.count(), 5);
    assert!(!index.has_deletions());

    // Exactly one segment remains on disk: one .cfs file.
    let cfs_files: Vec<String> = directory
        .list()
        .unwrap()
        .into_iter()
        .filter(|name| name.ends_with(".cfs"))
        .collect();
    assert_eq!(cfs_files.len(), 1, "files: {cfs_files:?}");

    // All surviving documents are still searchable.
    assert_eq!(index.find("contents:submitting").unwrap().len(), 2);
    assert!(index.find("contents:bugs").unwrap().is_empty());
}

#[test]
fn test_term_stream_is_sorted_and_unique() {
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let mut index = Index::create_in(directory, true)
        .unwrap()
        .with_writer_config(WriterConfig::default().with_max_buffered_docs(2));

    for document in sample_corpus() {
        index.add_document(document).unwrap();
    }
    index.commit().unwrap();

    index.reset_terms_stream().unwrap();
    let mut terms = Vec::new();
    while let Some(term) = index.next_term().unwrap() {
        terms.push(term);
    }
    index.close_terms_stream();

    assert!(!terms.is_empty());
    for window in terms.windows(2) {
        assert!(window[0] < window[1], "{:?} !< {:?}", window[0], window[1]);
    }

    // skip_to lands on the least term >= target.
    let target = Term::new("contents", "submitti");
    let landed = index.skip_to(&target).unwrap().unwrap();
    assert_eq!(landed, Term::new("contents", "submitting"));
    assert_eq!(index.current_term().unwrap(), landed);

    // And an exact target lands on itself.
    let landed = index.skip_to(&Term::new("contents", "bugs")).unwrap().unwrap();
    assert_eq!(landed, Term::new("contents", "bugs"));
}

#[test]
fn test_multi_segment_global_ids() {
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let mut index = Index::create_in(directory, true)
        .unwrap()
        .with_writer_config(
            WriterConfig::default()
                .with_max_buffered_docs(2)
                .with_merge_factor(100),
        );

    for document in sample_corpus() {
        index.add_document(document).unwrap();
    }
    index.commit().unwrap();

    // Three segments of two documents each; ids follow segment order.
    for id in 0..6u32 {
        let fetched = index.document(id).unwrap();
        assert_eq!(
            fetched.field("id").unwrap().value.as_text(),
            Some(id.to_string().as_str())
        );
    }
    assert!(index.document(6).is_err());
}

#[test]
fn test_sorted_find() {
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let mut index = Index::create_in(directory, true).unwrap();

    for document in sample_corpus() {
        index.add_document(document).unwrap();
    }
    index.commit().unwrap();

    let hits = index
        .find_sorted(
            "contents:submitting",
            &[SortField::descending("title")],
        )
        .unwrap();
    let titles: Vec<String> = hits
        .iter()
        .map(|h| {
            index
                .document(h.id)
                .unwrap()
                .field("title")
                .unwrap()
                .value
                .as_text()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(titles, vec!["Wishlists", "Submitting Patches"]);

    let err = index
        .find_sorted("contents:submitting", &[SortField::ascending("nope")])
        .unwrap_err();
    assert_eq!(err.to_string(), "Wrong field name.");
}

#[test]
fn test_plain_layout_round_trip() {
    let temp = TempDir::new().unwrap();
    {
        let directory: Arc<dyn Directory> =
            Arc::new(FsDirectory::open(temp.path()).unwrap());
        let mut index = Index::create_in(directory, true)
            .unwrap()
            .with_writer_config(WriterConfig::default().with_compound_file(false));
        for document in sample_corpus() {
            index.add_document(document).unwrap();
        }
        index.commit().unwrap();
    }

    let index = Index::open(temp.path()).unwrap();
    assert_eq!(index.num_docs(), 6);
    assert_eq!(index.find("contents:bugs").unwrap().len(), 1);
}
