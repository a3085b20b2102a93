//! Rewrite and optimize behaviour of parsed queries against a live index.

use std::sync::Arc;

use lucerna::directory::RamDirectory;
use lucerna::document::{Document, Field};
use lucerna::index::Index;
use lucerna::query::{Query, QueryParser};
use lucerna::SearchConfig;

/// An index whose indexed fields are `path`, `modified`, `contents`, in
/// that order.
fn crawl_index() -> Index {
    let mut index = Index::create_in(Arc::new(RamDirectory::new()), true).unwrap();
    index
        .add_document(
            Document::new()
                .with_field(Field::keyword("path", "/jakarta/index.html"))
                .with_field(Field::keyword("modified", "2007-04-01"))
                .with_field(Field::un_stored(
                    "contents",
                    "jakarta apache project documentation",
                )),
        )
        .unwrap();
    index
        .add_document(
            Document::new()
                .with_field(Field::keyword("path", "/apache/news.html"))
                .with_field(Field::keyword("modified", "2007-05-12"))
                .with_field(Field::un_stored("contents", "apache software foundation news")),
        )
        .unwrap();
    index.commit().unwrap();
    index
}

/// An index with `title` and `text` fields.
fn docs_index() -> Index {
    let mut index = Index::create_in(Arc::new(RamDirectory::new()), true).unwrap();
    index
        .add_document(
            Document::new()
                .with_field(Field::text("title", "Getting Started"))
                .with_field(Field::un_stored("text", "how to go from zero to a search")),
        )
        .unwrap();
    index
        .add_document(
            Document::new()
                .with_field(Field::text("title", "The Right Way"))
                .with_field(Field::un_stored("text", "doing things properly")),
        )
        .unwrap();
    index.commit().unwrap();
    index
}

fn parser(index: &Index) -> QueryParser {
    QueryParser::new(index.search_config().clone(), index.analyzer().clone())
}

fn rewrite_string(index: &Index, query: &str) -> String {
    parser(index)
        .parse(query)
        .unwrap()
        .rewrite(index)
        .unwrap()
        .to_query_string()
}

#[test]
fn test_rewrite_field_qualified_phrase_and_term() {
    let index = docs_index();
    assert_eq!(
        rewrite_string(&index, "title:\"The Right Way\" AND text:go"),
        "+(title:\"the right way\") +(text:go)"
    );
}

#[test]
fn test_rewrite_expands_unqualified_terms_across_fields() {
    let index = crawl_index();
    assert_eq!(
        rewrite_string(&index, "jakarta apache"),
        "(path:jakarta modified:jakarta contents:jakarta) \
         (path:apache modified:apache contents:apache)"
    );
}

#[test]
fn test_rewrite_keeps_boosts() {
    let index = crawl_index();
    assert_eq!(
        rewrite_string(&index, "jakarta^4 apache"),
        "((path:jakarta modified:jakarta contents:jakarta)^4) \
         (path:apache modified:apache contents:apache)"
    );
}

#[test]
fn test_suppressed_syntax_error_falls_back_to_multi_term() {
    let index = crawl_index();
    let query = parser(&index).parse("contents:[business TO by}").unwrap();
    assert_eq!(query.to_query_string(), "contents business to by");
}

#[test]
fn test_impossible_phrase_optimizes_to_empty() {
    let index = docs_index();
    let optimized = parser(&index)
        .parse("\"Non-existing phrase\" AND Home")
        .unwrap()
        .rewrite(&index)
        .unwrap()
        .optimize(&index)
        .unwrap();
    assert_eq!(optimized.to_query_string(), "<EmptyQuery>");
}

#[test]
fn test_default_search_field_limits_expansion() {
    let mut index = crawl_index();
    index.search_config_mut().default_search_field = Some("contents".to_string());
    assert_eq!(rewrite_string(&index, "jakarta"), "contents:jakarta");
}

#[test]
fn test_stop_word_only_term_is_insignificant() {
    let index = docs_index();
    // Punctuation-only input survives parsing but analyzes to nothing.
    let query = parser(&index).parse("title:...").unwrap();
    let rewritten = query.rewrite(&index).unwrap();
    assert_eq!(rewritten.to_query_string(), "<InsignificantQuery>");
}

#[test]
fn test_keyword_field_exact_match_bypasses_analysis() {
    let index = crawl_index();
    // The keyword term exists with punctuation the analyzer would split.
    let query = parser(&index).parse("path:/jakarta/index.html").unwrap();
    let rewritten = query.rewrite(&index).unwrap();
    assert_eq!(rewritten.to_query_string(), "path:/jakarta/index.html");
}

#[test]
fn test_wildcard_rewrite_enumerates_terms() {
    let index = crawl_index();
    let rewritten = parser(&index)
        .parse("contents:apa*")
        .unwrap()
        .rewrite(&index)
        .unwrap();
    assert_eq!(rewritten.to_query_string(), "contents:apache");
}

#[test]
fn test_wildcard_prefix_too_short() {
    let index = crawl_index();
    let config = SearchConfig::default().with_suppress_query_errors(false);
    let parser = QueryParser::new(config, index.analyzer().clone());
    let err = parser
        .parse("contents:a*")
        .unwrap()
        .rewrite(&index)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "At least 3 non-wildcard characters are required at the head of pattern"
    );
}

#[test]
fn test_range_rewrite_enumerates_terms() {
    let index = crawl_index();
    // contents terms: apache documentation foundation jakarta news project
    // software; [documentation TO news] inclusive picks four of them.
    let rewritten = parser(&index)
        .parse("contents:[documentation TO news]")
        .unwrap()
        .rewrite(&index)
        .unwrap();
    assert_eq!(
        rewritten.to_query_string(),
        "contents:documentation contents:foundation contents:jakarta contents:news"
    );

    // The exclusive flavour drops both boundary terms.
    let rewritten = parser(&index)
        .parse("contents:{documentation TO news}")
        .unwrap()
        .rewrite(&index)
        .unwrap();
    assert_eq!(
        rewritten.to_query_string(),
        "contents:foundation contents:jakarta"
    );
}

#[test]
fn test_fuzzy_rewrite_keeps_similar_terms() {
    let index = crawl_index();
    let rewritten = parser(&index)
        .parse("contents:apachi~")
        .unwrap()
        .rewrite(&index)
        .unwrap();
    // "apache" is one edit away from "apachi".
    let rendered = rewritten.to_query_string();
    assert!(
        rendered.contains("contents:apache"),
        "unexpected rewrite: {rendered}"
    );
}

#[test]
fn test_multi_token_term_becomes_required_multi_term() {
    let index = crawl_index();
    // One word lexeme, but the analyzer splits it at the dot: the rewrite
    // produces a conjunction of the tokens.
    let rewritten = parser(&index)
        .parse("contents:apache.software")
        .unwrap()
        .rewrite(&index)
        .unwrap();
    assert_eq!(
        rewritten.to_query_string(),
        "+contents:apache +contents:software"
    );
}
