use chrono::{DateTime, TimeZone, Utc};
use news_dedup_pipeline::ingest::parser::{parse_all, parse_document, parse_entries, RecencyFilter};
use news_dedup_pipeline::ingest::types::{FetchOutcome, Location, RawFeedDocument};

const MARKETS_RSS: &str = include_str!("fixtures/markets_rss.xml");
const WORLD_ATOM: &str = include_str!("fixtures/world_atom.xml");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()
}

fn filter() -> RecencyFilter {
    RecencyFilter::new(now(), chrono::Duration::hours(1))
}

fn doc(source: &str, body: &str) -> RawFeedDocument {
    RawFeedDocument {
        source: source.into(),
        url: format!("https://{}.test/feed", source.to_lowercase()),
        body: body.into(),
    }
}

#[test]
fn rss_fixture_keeps_recent_undated_and_future_items() {
    let items = parse_document(&doc("Markets", MARKETS_RSS), &filter());
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "FED raises interest rates",
            "Breaking: bond auction results",
            "Earnings preview for tomorrow"
        ]
    );

    let fed = &items[0];
    assert_eq!(fed.source, "Markets");
    assert_eq!(fed.link, "https://markets.test/fed-raises");
    assert_eq!(
        fed.summary,
        "The Federal Reserve lifted its benchmark rate by a quarter point. Markets slipped after the decision."
    );
    assert_eq!(fed.location, Location::Pending);

    // Undated entry is stamped with the run's now.
    assert_eq!(items[1].published_at, now());
    assert_eq!(items[1].summary, "Demand was strong - yields fell.");
}

#[test]
fn atom_fixture_uses_published_then_updated_and_alternate_link() {
    let items = parse_document(&doc("World", WORLD_ATOM), &filter());
    assert_eq!(items.len(), 2);

    assert_eq!(items[0].title, "Federal Reserve hikes rates");
    assert_eq!(
        items[0].published_at,
        Utc.with_ymd_and_hms(2025, 6, 10, 14, 35, 0).unwrap()
    );
    assert_eq!(items[0].link, "https://world.test/fed");

    assert_eq!(items[1].link, "https://world.test/summit");
    assert_eq!(items[1].summary, "Leaders left Brussels with no agreement.");
}

#[test]
fn every_emitted_item_is_inside_the_window() {
    let f = filter();
    for body in [MARKETS_RSS, WORLD_ATOM] {
        for item in parse_document(&doc("X", body), &f) {
            assert!(now() - item.published_at <= chrono::Duration::hours(1), "{}", item.title);
        }
    }
}

#[test]
fn garbage_and_empty_documents_yield_nothing() {
    assert!(parse_document(&doc("Bad", "<html><body>not a feed"), &filter()).is_empty());
    assert!(parse_document(&doc("Bad", ""), &filter()).is_empty());

    let empty_channel = r#"<rss version="2.0"><channel><title>t</title></channel></rss>"#;
    assert!(parse_entries(empty_channel).unwrap().is_empty());
}

#[tokio::test]
async fn parallel_parse_merges_in_outcome_order() {
    let outcomes = vec![
        FetchOutcome::Fetched(doc("World", WORLD_ATOM)),
        FetchOutcome::Failed {
            source: "Down".into(),
            url: "https://down.test/rss".into(),
            reason: "HTTP status 503".into(),
        },
        FetchOutcome::Fetched(doc("Markets", MARKETS_RSS)),
    ];
    let items = parse_all(outcomes, filter()).await;
    let sources: Vec<_> = items.iter().map(|i| i.source.as_str()).collect();
    assert_eq!(sources, vec!["World", "World", "Markets", "Markets", "Markets"]);
}

fn titles(body: &str) -> Vec<String> {
    parse_document(&doc("T", body), &filter())
        .into_iter()
        .map(|i| i.title)
        .collect()
}

#[test]
fn stale_dc_date_is_not_mistaken_for_undated() {
    let entries = parse_entries(MARKETS_RSS).unwrap();
    let archive = entries
        .iter()
        .find(|e| e.title.as_deref() == Some("Archive: the 2020 rate path"))
        .unwrap();
    assert_eq!(archive.timestamps, vec!["2020-01-01T00:00:00Z".to_string()]);

    let items = parse_document(&doc("Markets", MARKETS_RSS), &filter());
    assert!(items.iter().all(|i| i.link != "https://markets.test/archive"));
}

#[test]
fn dc_date_dates_an_item_without_pub_date() {
    let body = r#"<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
      <item><title>Wire copy</title><description>Filed.</description>
        <dc:date>2025-06-10T14:20:00Z</dc:date></item>
      <item><title>Both dates</title><description>Filed.</description>
        <pubDate>Tue, 10 Jun 2025 14:40:00 GMT</pubDate><dc:date>2025-06-10T14:00:00Z</dc:date></item>
    </channel></rss>"#;
    let items = parse_document(&doc("Wire", body), &filter());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].published_at, Utc.with_ymd_and_hms(2025, 6, 10, 14, 20, 0).unwrap());
    assert_eq!(items[1].published_at, Utc.with_ymd_and_hms(2025, 6, 10, 14, 40, 0).unwrap());
}

#[test]
fn media_rss_extensions_do_not_hide_the_feed() {
    let body = r#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"><channel>
      <item>
        <title>Chipmakers rally</title>
        <link>https://finance.test/chips</link>
        <description>Semiconductor stocks led the gains.</description>
        <media:description>Photo: trading floor</media:description>
        <media:title>Trading floor</media:title>
        <media:content url="https://finance.test/chips.jpg" medium="image"/>
        <pubDate>Tue, 10 Jun 2025 14:45:00 GMT</pubDate>
      </item>
      <item>
        <title>Yen weakens</title>
        <link>https://finance.test/yen</link>
        <description>The currency slid past 150.</description>
        <pubDate>Tue, 10 Jun 2025 14:50:00 GMT</pubDate>
      </item>
    </channel></rss>"#;
    let items = parse_document(&doc("Finance", body), &filter());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Chipmakers rally");
    assert_eq!(items[0].summary, "Semiconductor stocks led the gains.");
    assert_eq!(items[0].link, "https://finance.test/chips");
    assert_eq!(items[1].title, "Yen weakens");
}

#[test]
fn odd_entry_does_not_cost_its_neighbours() {
    let body = r#"<rss version="2.0"><channel>
      <item><title>First title</title><title>Second title</title>
        <description>Repeated title tag.</description></item>
      <item><link>https://odd.test/empty</link></item>
      <item><title>Clean item</title><description>Nothing odd.</description></item>
    </channel></rss>"#;
    assert_eq!(titles(body), vec!["First title", "Clean item"]);
}

#[test]
fn broken_tail_keeps_the_entries_before_it() {
    let body = r#"<rss version="2.0"><channel>
      <item><title>Good item</title><description>Fine.</description></item>
      <item><title>Broken item</titel><description>Never closed properly."#;
    assert_eq!(titles(body), vec!["Good item"]);
}

#[test]
fn inline_xhtml_description_is_flattened_to_text() {
    let body = r#"<rss version="2.0"><channel>
      <item><title>Markup</title>
        <description><p>Rates <b>held</b> steady.</p><p>Markets calm.</p></description></item>
    </channel></rss>"#;
    let items = parse_document(&doc("X", body), &filter());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].summary, "Rates held steady. Markets calm.");
}

#[test]
fn rss1_rdf_feed_is_recognised() {
    let body = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://lab.test/">
    <title>Lab notes</title>
    <link>https://lab.test/</link>
    <items><rdf:Seq><rdf:li rdf:resource="https://lab.test/a"/></rdf:Seq></items>
  </channel>
  <item rdf:about="https://lab.test/a">
    <title>Preprint released</title>
    <link>https://lab.test/a</link>
    <description>A new working paper on inflation.</description>
    <dc:date>2025-06-10T14:45:00Z</dc:date>
  </item>
</rdf:RDF>"#;
    let items = parse_document(&doc("Lab", body), &filter());
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Preprint released");
    assert_eq!(items[0].link, "https://lab.test/a");
    assert_eq!(items[0].published_at, Utc.with_ymd_and_hms(2025, 6, 10, 14, 45, 0).unwrap());
}
