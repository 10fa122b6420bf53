//! Fixed EPUB 2 documents: container, stylesheet, cover and chapter pages.

use crate::scraper::{escape_attr, escape_text};

pub(super) const MIMETYPE: &[u8] = b"application/epub+zip";

pub(super) const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

pub(super) const STYLE_CSS: &str = r#"body {
  font-family: serif;
  line-height: 1.5;
  margin: 0 5%;
}
h1 {
  font-size: 1.4em;
  text-align: center;
  margin: 1em 0 1.5em;
}
p {
  text-indent: 1.5em;
  margin: 0 0 0.6em;
}
img {
  max-width: 100%;
}
div.cover {
  text-align: center;
  margin: 0;
  padding: 0;
}
div.cover img {
  height: 100%;
}
"#;

const XHTML11_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en">
<head>
  <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8"/>"#;

/// Chapter page. `body` is inserted as-is and must already be well-formed XHTML.
pub(super) fn chapter_xhtml(title: &str, body: &str) -> String {
    let title = escape_text(title);
    format!(
        r#"{XHTML11_HEAD}
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="../style.css"/>
</head>
<body>
  <h1>{title}</h1>
{body}
</body>
</html>
"#
    )
}

pub(super) fn cover_xhtml(title: &str) -> String {
    let title = escape_attr(title);
    format!(
        r#"{XHTML11_HEAD}
  <title>Cover</title>
  <link rel="stylesheet" type="text/css" href="../style.css"/>
</head>
<body>
  <div class="cover">
    <img src="../Images/cover.jpg" alt="{title}"/>
  </div>
</body>
</html>
"#
    )
}
