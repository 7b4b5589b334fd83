use std::error::Error;

use folio_core::{
    Document, EmitContext, FloatKind, FootnoteStyle, LabelDictionary, LiteralCache, Node, NodeKind,
    NumberingResult, SectionLevel, W_LABEL_DUP, W_REF_UNDEFINED, build_toc, emit_html,
    number_document, parse_xml, place_footnotes, resolve_references,
};

fn numbered(xml: &str, article: bool) -> Result<(Document, NumberingResult), Box<dyn Error>> {
    let mut document = parse_xml(xml)?;
    let result = number_document(&mut document, &LiteralCache::new(), article);
    Ok((document, result))
}

fn find_all<'a>(node: &'a Node, kind: &NodeKind, out: &mut Vec<&'a Node>) {
    if &node.kind == kind {
        out.push(node);
    }
    for child in &node.children {
        find_all(child, kind, out);
    }
}

fn numbers_of(document: &Document, kind: NodeKind) -> Vec<Option<String>> {
    let mut found = Vec::new();
    find_all(&document.root, &kind, &mut found);
    found.into_iter().map(|node| node.number.clone()).collect()
}

fn html(document: &Document) -> String {
    let dictionary = LabelDictionary::default();
    emit_html(
        document,
        &EmitContext {
            dictionary: &dictionary,
            toc: None,
        },
    )
}

const TWO_CHAPTERS: &str = r#"<document>
  <chapter label="cha:one"><title>One</title>
    <section><title>Alpha</title>
      <figure label="fig:a"><caption>First figure</caption></figure>
    </section>
  </chapter>
  <chapter><title>Two</title>
    <section><title>Beta</title></section>
    <figure label="fig:b"><caption>Second figure</caption></figure>
  </chapter>
</document>"#;

#[test]
fn figures_restart_per_chapter() -> Result<(), Box<dyn Error>> {
    let (document, result) = numbered(TWO_CHAPTERS, false)?;
    assert!(result.diagnostics.is_empty());
    assert_eq!(
        numbers_of(&document, NodeKind::Sectioning(SectionLevel::Chapter)),
        vec![Some("1".to_string()), Some("2".to_string())]
    );
    assert_eq!(
        numbers_of(&document, NodeKind::Sectioning(SectionLevel::Section)),
        vec![Some("1.1".to_string()), Some("2.1".to_string())]
    );
    assert_eq!(
        numbers_of(&document, NodeKind::Float(FloatKind::Figure)),
        vec![Some("1.1".to_string()), Some("2.1".to_string())]
    );

    let fig_b = result.labels.get("fig:b").ok_or("fig:b missing")?;
    assert_eq!(fig_b.number, "2.1");
    assert_eq!(fig_b.id, "fig:b");
    assert_eq!(fig_b.kind, "figure");
    let chapter = result.labels.get("cha:one").ok_or("cha:one missing")?;
    assert_eq!(chapter.number, "1");

    let out = html(&document);
    assert!(out.contains("<div id=\"chapter-2\" class=\"chapter\">"));
    assert!(out.contains("<div id=\"section-2-1\" class=\"section\">"));
    assert!(out.contains("<span class=\"header\">Figure 2.1</span>"));
    Ok(())
}

#[test]
fn unnumbered_sections_get_slug_ids_and_title_numbers() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <frontmatter><chapter label="cha:preface"><title>Preface</title></chapter></frontmatter>
      <mainmatter>
        <chapter><title>Start</title>
          <section starred="true"><title>A Note</title></section>
          <section starred="true"><title>A Note</title></section>
          <section><title>Real</title></section>
        </chapter>
      </mainmatter>
    </document>"#;
    let (document, result) = numbered(xml, false)?;

    let preface = result.labels.get("cha:preface").ok_or("preface missing")?;
    assert_eq!(preface.number, "Preface");
    assert_eq!(preface.id, "cha:preface");

    let mut sections = Vec::new();
    find_all(
        &document.root,
        &NodeKind::Sectioning(SectionLevel::Section),
        &mut sections,
    );
    let ids: Vec<Option<&str>> = sections
        .iter()
        .map(|section| section.attrs.id.as_deref())
        .collect();
    assert_eq!(ids, vec![Some("anote"), Some("anote-2"), Some("section-1-1")]);
    assert!(sections[0].has_class("unnumbered"));
    assert_eq!(sections[2].number.as_deref(), Some("1.1"));
    Ok(())
}

#[test]
fn article_mode_numbers_sections_from_one() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>Ignored Chapter</title>
        <section><title>First</title><subsection><title>Inner</title></subsection></section>
        <section><title>Second</title><table><caption>T</caption></table></section>
      </chapter>
    </document>"#;
    let (document, _) = numbered(xml, true)?;
    assert_eq!(
        numbers_of(&document, NodeKind::Sectioning(SectionLevel::Chapter)),
        vec![None]
    );
    assert_eq!(
        numbers_of(&document, NodeKind::Sectioning(SectionLevel::Section)),
        vec![Some("1".to_string()), Some("2".to_string())]
    );
    assert_eq!(
        numbers_of(&document, NodeKind::Sectioning(SectionLevel::Subsection)),
        vec![Some("1.1".to_string())]
    );

    let toc = build_toc(&document, true);
    let depths: Vec<usize> = toc.entries.iter().map(|entry| entry.depth).collect();
    assert_eq!(depths, vec![1, 2, 1]);
    Ok(())
}

#[test]
fn duplicate_labels_keep_the_first_target() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter label="dup"><title>One</title></chapter>
      <chapter label="dup"><title>Two</title></chapter>
    </document>"#;
    let (_, result) = numbered(xml, false)?;
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, W_LABEL_DUP);
    assert_eq!(
        result.labels.get("dup").map(|target| target.number.as_str()),
        Some("1")
    );
    Ok(())
}

#[test]
fn math_labels_are_lifted_onto_the_equation() -> Result<(), Box<dyn Error>> {
    let mut cache = LiteralCache::new();
    let label = cache.cache_label("eq:euler");
    let xml = format!(
        "<document><chapter><title>Math</title>\
         <equation><displaymath>e = m c^2 {}</displaymath></equation>\
         <p>By <eqref target=\"eq:euler\"/> we are done.</p></chapter></document>",
        label
    );
    let mut document = parse_xml(&xml)?;
    let numbering = number_document(&mut document, &cache, false);
    let target = numbering.labels.get("eq:euler").ok_or("equation label missing")?;
    assert_eq!(target.number, "1.1");
    assert_eq!(target.kind, "equation");

    let diagnostics = resolve_references(
        &mut document,
        &numbering.labels,
        &LabelDictionary::default(),
        &cache,
    );
    assert!(diagnostics.is_empty());
    let out = html(&document);
    assert!(!out.contains(&label));
    assert!(out.contains("<div class=\"equation_number\">(1.1)</div>"));
    assert!(out.contains(
        "<a href=\"#eq:euler\" class=\"hyperref\"><span class=\"ref\">(1.1)</span></a>"
    ));
    Ok(())
}

#[test]
fn labelled_alignments_number_as_equations() -> Result<(), Box<dyn Error>> {
    let mut cache = LiteralCache::new();
    let first = cache.cache_label("eq:first");
    let aligned = cache.cache_label("eq:aligned");
    let xml = format!(
        "<document><chapter><title>Math</title>\
         <equation><displaymath>x = 1 {}</displaymath></equation>\
         <align><displaymath>y = 2 {}</displaymath></align>\
         <p>Then <eqref target=\"eq:aligned\"/>.</p></chapter></document>",
        first, aligned
    );
    let mut document = parse_xml(&xml)?;
    let numbering = number_document(&mut document, &cache, false);
    let target = numbering.labels.get("eq:aligned").ok_or("alignment label missing")?;
    assert_eq!(target.number, "1.2");
    assert_eq!(target.kind, "equation");

    let diagnostics = resolve_references(
        &mut document,
        &numbering.labels,
        &LabelDictionary::default(),
        &cache,
    );
    assert!(diagnostics.is_empty());
    let out = html(&document);
    assert!(!out.contains(&aligned));
    assert!(out.contains("<div class=\"equation_number\">(1.2)</div>"));
    assert!(out.contains("<span class=\"ref\">(1.2)</span>"));
    Ok(())
}

#[test]
fn undefined_references_never_fail() -> Result<(), Box<dyn Error>> {
    let xml = r##"<document>
      <chapter><title>Refs</title>
        <p>See Figure <ref target="fig:nowhere"/> and <a href="#sec:nowhere">there</a>.</p>
      </chapter>
    </document>"##;
    let (mut document, numbering) = numbered(xml, false)?;
    let diagnostics = resolve_references(
        &mut document,
        &numbering.labels,
        &LabelDictionary::default(),
        &LiteralCache::new(),
    );
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].code, W_REF_UNDEFINED);

    let out = html(&document);
    assert!(out.contains("<span class=\"undefined_ref\">fig:nowhere</span>"));
    assert!(out.contains("<a href=\"#sec:nowhere\" class=\"undefined_ref\">there</a>"));
    Ok(())
}

#[test]
fn linking_word_joins_the_hyperlink() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter label="cha:one"><title>One</title>
        <figure label="fig:a"><caption>A</caption></figure>
        <p>As shown in Figure <ref target="fig:a"/>, it works.</p>
      </chapter>
    </document>"#;
    let (mut document, numbering) = numbered(xml, false)?;
    resolve_references(
        &mut document,
        &numbering.labels,
        &LabelDictionary::default(),
        &LiteralCache::new(),
    );
    let out = html(&document);
    assert!(out.contains(
        "<p>As shown in <a href=\"#fig:a\" class=\"hyperref\">Figure <span class=\"ref\">1.1</span></a>, it works.</p>"
    ));
    Ok(())
}

#[test]
fn footnotes_count_per_chapter_in_document_order() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>One</title>
        <p>A<footnote>first</footnote> b<footnote>second</footnote> c<footnote>third</footnote></p>
      </chapter>
      <chapter><title>Two</title>
        <p>D<footnote>fourth</footnote></p>
      </chapter>
    </document>"#;
    let (mut document, _) = numbered(xml, false)?;
    assert_eq!(place_footnotes(&mut document, FootnoteStyle::Numbered), 4);

    let mut lists = Vec::new();
    collect_lists(&document.root, &mut lists);
    assert_eq!(
        lists,
        vec![
            (1, vec![(1, "first".to_string()), (2, "second".to_string()), (3, "third".to_string())]),
            (2, vec![(1, "fourth".to_string())]),
        ]
    );

    let out = html(&document);
    assert!(out.contains(
        "<sup id=\"cha-1_footnote-ref-2\" class=\"footnote\"><a href=\"#cha-1_footnote-2\">2</a></sup>"
    ));
    assert!(out.contains("<div id=\"cha-1_footnotes\" class=\"footnotes\">"));
    assert!(out.contains(
        "<li id=\"cha-2_footnote-1\">fourth <a class=\"arrow\" href=\"#cha-2_footnote-ref-1\">↑</a></li>"
    ));
    Ok(())
}

#[test]
fn nested_footnotes_list_in_document_order() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>One</title>
        <p>A<footnote>outer<footnote>inner</footnote></footnote> b<footnote>last</footnote></p>
      </chapter>
    </document>"#;
    let (mut document, _) = numbered(xml, false)?;
    assert_eq!(place_footnotes(&mut document, FootnoteStyle::Numbered), 3);

    let mut lists = Vec::new();
    collect_lists(&document.root, &mut lists);
    assert_eq!(
        lists,
        vec![(
            1,
            vec![(1, "outer".to_string()), (2, "inner".to_string()), (3, "last".to_string())]
        )]
    );
    Ok(())
}

#[test]
fn starred_section_footnote_attaches_to_previous_chapter() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>One</title><p>First.<footnote>n1</footnote> More text.</p></chapter>
      <section starred="true"><title>Interlude</title><p>Aside<footnote>n2</footnote></p></section>
      <chapter><title>Two</title><p>Later<footnote>n3</footnote></p></chapter>
    </document>"#;
    let (mut document, _) = numbered(xml, false)?;
    place_footnotes(&mut document, FootnoteStyle::Numbered);

    let kinds: Vec<&NodeKind> = document.root.children.iter().map(|node| &node.kind).collect();
    assert_eq!(kinds.len(), 5);
    assert_eq!(*kinds[2], NodeKind::FootnoteList { chapter: 1 });
    assert_eq!(*kinds[3], NodeKind::Sectioning(SectionLevel::Chapter));
    assert_eq!(*kinds[4], NodeKind::FootnoteList { chapter: 2 });

    let mut lists = Vec::new();
    collect_lists(&document.root, &mut lists);
    assert_eq!(
        lists[0],
        (1, vec![(1, "n1".to_string()), (2, "n2".to_string())])
    );

    // "First." ends a sentence and text follows the note.
    let paragraph = &document.root.children[0].children[1];
    assert_eq!(paragraph.children[2].kind, NodeKind::IntersentenceSpace);
    Ok(())
}

#[test]
fn symbol_mode_marks_notes_with_symbols() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>One</title><p>a<footnote>x</footnote> b<footnote>y</footnote></p></chapter>
    </document>"#;
    let (mut document, _) = numbered(xml, false)?;
    place_footnotes(&mut document, FootnoteStyle::Symbols);
    let out = html(&document);
    assert!(out.contains("<a href=\"#cha-1_footnote-1\">*</a>"));
    assert!(out.contains("<a href=\"#cha-1_footnote-2\">†</a>"));
    assert!(out.contains("<ol class=\"footnotes nonumbers\">"));
    Ok(())
}

#[test]
fn outline_nests_under_two_top_level_items() -> Result<(), Box<dyn Error>> {
    let xml = r#"<document>
      <chapter><title>One</title>
        <section><title>Sec</title>
          <subsection><title>Sub</title></subsection>
        </section>
      </chapter>
      <chapter><title>Two &amp; more</title></chapter>
    </document>"#;
    let (document, _) = numbered(xml, false)?;
    let toc = build_toc(&document, false);
    assert_eq!(toc.entries.len(), 4);

    let outline = toc.to_html();
    let parsed = roxmltree::Document::parse(&outline)?;
    let root = parsed.root_element();
    assert_eq!(root.attribute("id"), Some("table_of_contents"));
    let top = root
        .children()
        .find(|node| node.has_tag_name("ul"))
        .ok_or("outline list missing")?;
    let items: Vec<_> = top.children().filter(|node| node.has_tag_name("li")).collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].attribute("class"), Some("chapter"));
    assert!(outline.contains("<span class=\"number\">1.1.1</span> Sub"));
    assert!(outline.contains("Two &amp; more"));
    Ok(())
}

fn collect_lists(node: &Node, out: &mut Vec<(u32, Vec<(usize, String)>)>) {
    if let NodeKind::FootnoteList { chapter } = node.kind {
        let items = node
            .children
            .iter()
            .filter_map(|item| match &item.kind {
                NodeKind::FootnoteItem { mark } => Some((mark.index, item.plain_text())),
                _ => None,
            })
            .collect();
        out.push((chapter, items));
        return;
    }
    for child in &node.children {
        collect_lists(child, out);
    }
}
