//! OPF package document and NCX navigation map.

use crate::scraper::{escape_attr, escape_text};
use crate::model::Novel;
use chrono::{DateTime, Utc};

pub(super) const NCX_PATH: &str = "OEBPS/toc.ncx";
pub(super) const OPF_PATH: &str = "OEBPS/content.opf";
pub(super) const STYLE_PATH: &str = "OEBPS/style.css";
pub(super) const COVER_IMAGE_PATH: &str = "OEBPS/Images/cover.jpg";
pub(super) const COVER_PAGE_PATH: &str = "OEBPS/Text/cover.xhtml";

/// Href of the chapter at 1-based `position`, relative to `OEBPS/`.
pub(super) fn chapter_href(position: usize) -> String {
    format!("Text/chapter_{:04}.xhtml", position)
}

/// Everything the package documents need besides the novel itself.
pub(super) struct Package<'a> {
    pub novel: &'a Novel,
    /// `urn:uuid:...`, shared by the OPF and the NCX.
    pub identifier: &'a str,
    pub generated: DateTime<Utc>,
    pub has_cover: bool,
}

impl Package<'_> {
    pub fn render_opf(&self) -> String {
        let novel = self.novel;
        let mut metadata = format!(
            r#"    <dc:title>{}</dc:title>
    <dc:creator opf:role="aut">{}</dc:creator>
    <dc:language>en</dc:language>
    <dc:date>{}</dc:date>
    <dc:identifier id="BookId" opf:scheme="UUID">{}</dc:identifier>
    <dc:source>{}</dc:source>
"#,
            escape_text(&novel.title),
            escape_text(&novel.author),
            self.generated.format("%Y-%m-%dT%H:%M:%SZ"),
            escape_text(self.identifier),
            escape_text(&novel.source_url),
        );

        let mut manifest = String::from(
            r#"    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="style" href="style.css" media-type="text/css"/>
"#,
        );
        let mut spine = String::new();
        if self.has_cover {
            metadata.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
            manifest.push_str(
                r#"    <item id="cover-image" href="Images/cover.jpg" media-type="image/jpeg"/>
    <item id="cover-page" href="Text/cover.xhtml" media-type="application/xhtml+xml"/>
"#,
            );
            spine.push_str("    <itemref idref=\"cover-page\"/>\n");
        }
        for position in 1..=novel.chapters.len() {
            manifest.push_str(&format!(
                "    <item id=\"chap_{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                position,
                chapter_href(position)
            ));
            spine.push_str(&format!("    <itemref idref=\"chap_{}\"/>\n", position));
        }

        let guide = if self.has_cover {
            "  <guide>\n    <reference type=\"cover\" title=\"Cover\" href=\"Text/cover.xhtml\"/>\n  </guide>\n"
        } else {
            ""
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
{guide}</package>
"#
        )
    }

    pub fn render_ncx(&self) -> String {
        let mut nav_points = String::new();
        for (i, chapter) in self.novel.chapters.iter().enumerate() {
            let position = i + 1;
            nav_points.push_str(&format!(
                r#"    <navPoint id="nav_{position}" playOrder="{position}">
      <navLabel><text>{}</text></navLabel>
      <content src="{}"/>
    </navPoint>
"#,
                escape_text(&chapter.title),
                chapter_href(position)
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>
"#,
            escape_attr(self.identifier),
            escape_text(&self.novel.title),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chapter, ChapterLink};
    use chrono::TimeZone;

    fn novel(chapters: usize) -> Novel {
        Novel {
            title: "Tom & Jerry".into(),
            author: "Hanna <Barbera>".into(),
            cover_url: None,
            source_url: "https://example.com/n?a=1&b=2".into(),
            chapters: (1..=chapters as u32)
                .map(|n| {
                    Chapter::new(
                        n,
                        ChapterLink {
                            title: format!("Part {}", n),
                            url: format!("https://example.com/c/{}", n),
                        },
                    )
                })
                .collect(),
        }
    }

    fn package(novel: &Novel, has_cover: bool) -> Package<'_> {
        Package {
            novel,
            identifier: "urn:uuid:00000000-0000-4000-8000-000000000000",
            generated: Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap(),
            has_cover,
        }
    }

    #[test]
    fn opf_metadata_is_escaped_and_complete() {
        let n = novel(2);
        let opf = package(&n, false).render_opf();
        assert!(opf.contains("<dc:title>Tom &amp; Jerry</dc:title>"));
        assert!(opf.contains(">Hanna &lt;Barbera&gt;</dc:creator>"));
        assert!(opf.contains("<dc:language>en</dc:language>"));
        assert!(opf.contains("<dc:date>2024-03-09T12:30:00Z</dc:date>"));
        assert!(opf.contains(">urn:uuid:00000000-0000-4000-8000-000000000000</dc:identifier>"));
        assert!(opf.contains("<dc:source>https://example.com/n?a=1&amp;b=2</dc:source>"));
        assert!(opf.contains("version=\"2.0\""));
        assert!(!opf.contains("cover"));
        assert!(!opf.contains("<guide>"));
    }

    #[test]
    fn opf_manifest_and_spine_follow_chapter_order() {
        let n = novel(3);
        let opf = package(&n, false).render_opf();
        assert_eq!(opf.matches("<item ").count(), 2 + 3);
        let spine: Vec<_> = opf
            .match_indices("<itemref idref=\"")
            .map(|(i, _)| {
                let rest = &opf[i + 16..];
                &rest[..rest.find('"').unwrap()]
            })
            .collect();
        assert_eq!(spine, ["chap_1", "chap_2", "chap_3"]);
        assert!(opf.contains(r#"href="Text/chapter_0003.xhtml""#));
        assert!(opf.contains("<spine toc=\"ncx\">"));
    }

    #[test]
    fn opf_with_cover_adds_items_meta_and_guide() {
        let n = novel(2);
        let opf = package(&n, true).render_opf();
        assert_eq!(opf.matches("<item ").count(), 4 + 2);
        assert!(opf.contains(r#"<meta name="cover" content="cover-image"/>"#));
        let cover = opf.find("idref=\"cover-page\"").unwrap();
        let first = opf.find("idref=\"chap_1\"").unwrap();
        assert!(cover < first);
        assert!(opf.contains(r#"<reference type="cover" title="Cover" href="Text/cover.xhtml"/>"#));
    }

    #[test]
    fn ncx_shares_identifier_and_orders_nav_points() {
        let n = novel(2);
        let p = package(&n, true);
        let ncx = p.render_ncx();
        assert!(ncx.contains(&format!(r#"<meta name="dtb:uid" content="{}"/>"#, p.identifier)));
        assert!(ncx.contains(r#"<meta name="dtb:depth" content="1"/>"#));
        assert!(ncx.contains(r#"<navPoint id="nav_1" playOrder="1">"#));
        assert!(ncx.contains(r#"<navPoint id="nav_2" playOrder="2">"#));
        assert!(ncx.contains("<text>Part 2</text>"));
        assert!(ncx.contains("<text>Tom &amp; Jerry</text>"));
        assert!(ncx.find("nav_1").unwrap() < ncx.find("nav_2").unwrap());
    }
}
