//! Minimal text-only PDF output: Helvetica 11pt on A4, wrapped and paginated.
//!
//! Text is written in WinAnsiEncoding, the encoding of the standard Type 1
//! fonts. Characters outside it are refused with
//! [`TemplateError::Unrenderable`].

use super::TemplateError;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN: u32 = 56;
const FONT_SIZE: u32 = 11;
const LEADING: u32 = 14;
/// Usable line width in glyph units (1/1000 em).
const LINE_UNITS: u32 = (PAGE_WIDTH - 2 * MARGIN) * 1000 / FONT_SIZE;

/// Helvetica advance widths for `' '..='~'`.
const ASCII_WIDTHS: [u32; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // digits
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // 'a'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Render paragraphs as a PDF document, `title` stored in the info dictionary.
pub fn render_text_pdf(title: &str, paragraphs: &[String]) -> Result<Vec<u8>, TemplateError> {
    let lines = wrap_paragraphs(paragraphs);
    let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(lines_per_page).collect()
    };

    // 1 catalog, 2 pages, 3 font, 4 info, then a page and content stream per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|index| 5 + index * 2).collect();
    let mut objects: Vec<Vec<u8>> = Vec::with_capacity(4 + pages.len() * 2);

    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).into_bytes());
    objects.push(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_vec());
    let mut info = b"<< /Title (".to_vec();
    info.extend(escape_text(title)?);
    info.extend_from_slice(b") /Producer (hoa-desk) >>");
    objects.push(info);

    for (page, page_id) in pages.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            )
            .into_bytes(),
        );

        let content = page_content(page)?;
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend(content);
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    let mut output = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(output.len());
        output.extend(format!("{} 0 obj\n", index + 1).into_bytes());
        output.extend_from_slice(body);
        output.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = output.len();
    output.extend(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).into_bytes());
    for offset in offsets {
        output.extend(format!("{offset:010} 00000 n \n").into_bytes());
    }
    output.extend(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R /Info 4 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .into_bytes(),
    );
    Ok(output)
}

fn page_content(lines: &[String]) -> Result<Vec<u8>, TemplateError> {
    let top = PAGE_HEIGHT - MARGIN - FONT_SIZE;
    let mut content = format!("BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {top} Td\n").into_bytes();
    for line in lines {
        content.push(b'(');
        content.extend(escape_text(line)?);
        content.extend_from_slice(b") Tj T*\n");
    }
    content.extend_from_slice(b"ET");
    Ok(content)
}

/// Whether every character of `text` can be written by [`render_text_pdf`].
pub fn pdf_renderable(text: &str) -> bool {
    text.chars().all(|c| c.is_control() || win_ansi(c).is_some())
}

/// Word-wrap every paragraph; blank paragraphs keep their vertical space.
fn wrap_paragraphs(paragraphs: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in paragraphs {
        for raw_line in paragraph.replace('\t', "    ").split('\n') {
            wrap_line(raw_line, &mut lines);
        }
    }
    lines
}

fn wrap_line(text: &str, lines: &mut Vec<String>) {
    let space = char_width(' ');
    let mut current = String::new();
    let mut width = 0;
    for word in text.split(' ') {
        if !current.is_empty() && width + space + text_width(word) > LINE_UNITS {
            lines.push(std::mem::take(&mut current));
            width = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            width += space;
        }
        // Hard-break words longer than a full line.
        for c in word.chars() {
            let advance = char_width(c);
            if !current.is_empty() && width + advance > LINE_UNITS {
                lines.push(std::mem::take(&mut current));
                width = 0;
            }
            current.push(c);
            width += advance;
        }
    }
    lines.push(current);
}

fn text_width(text: &str) -> u32 {
    text.chars().map(char_width).sum()
}

fn char_width(c: char) -> u32 {
    match c {
        ' '..='~' => ASCII_WIDTHS[c as usize - 0x20],
        c if c.is_control() => 0,
        '\u{2014}' | '\u{2026}' | '\u{2030}' | '\u{2122}' | '\u{00C6}' | '\u{0152}' => 1000,
        '\u{00E6}' | '\u{0153}' => 944,
        c if c.is_lowercase() => 556,
        _ => 722,
    }
}

/// WinAnsiEncoding byte for `c`.
fn win_ansi(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' | '\u{00A0}'..='\u{00FF}' => c as u32 as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Literal-string escaping; line breaks become spaces and other control
/// characters are dropped.
fn escape_text(text: &str) -> Result<Vec<u8>, TemplateError> {
    let mut escaped = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push(b'\\');
                escaped.push(c as u8);
            }
            '\r' | '\n' => escaped.push(b' '),
            c if c.is_control() => {}
            c => escaped.push(win_ansi(c).ok_or(TemplateError::Unrenderable(c))?),
        }
    }
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    fn render(title: &str, paragraphs: &[String]) -> Vec<u8> {
        render_text_pdf(title, paragraphs).expect("renderable text")
    }

    #[test]
    fn writes_a_single_page_document() {
        let pdf = render("Lease", &["Unit (A) \\ rent".to_string()]);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert_eq!(count(&pdf, b"/Type /Page "), 1);
        assert_eq!(count(&pdf, b"(Unit \\(A\\) \\\\ rent) Tj"), 1);
    }

    #[test]
    fn xref_points_at_objects() {
        let pdf = render("Lease", &["hello".to_string()]);
        let text = String::from_utf8_lossy(&pdf);
        let xref_at: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|line| line.parse().ok())
            .expect("startxref offset");
        assert!(pdf[xref_at..].starts_with(b"xref"));

        let tail = std::str::from_utf8(&pdf[xref_at..]).expect("ascii tail");
        let first_entry = &tail.lines().nth(3).expect("object 1 entry")[..10];
        let offset: usize = first_entry.parse().expect("offset");
        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn paginates_long_content() {
        let paragraphs: Vec<String> = (0..120).map(|n| format!("Line {n}")).collect();
        let pdf = render("Long", &paragraphs);
        assert_eq!(count(&pdf, b"/Type /Page "), 3);
        assert_eq!(count(&pdf, b"/Count 3"), 1);
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let mut lines = Vec::new();
        wrap_line(&"word ".repeat(40), &mut lines);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| text_width(line) <= LINE_UNITS));

        let mut long = Vec::new();
        wrap_line(&"x".repeat(200), &mut long);
        assert_eq!(long.len(), 3);
    }

    #[test]
    fn wide_glyphs_wrap_sooner_than_narrow_ones() {
        let mut wide = Vec::new();
        wrap_line(&"W".repeat(60), &mut wide);
        assert_eq!(wide.len(), 2);
        assert!(wide.iter().all(|line| text_width(line) <= LINE_UNITS));

        let mut narrow = Vec::new();
        wrap_line(&"i".repeat(60), &mut narrow);
        assert_eq!(narrow.len(), 1);
    }

    #[test]
    fn encodes_win_ansi_punctuation() {
        assert_eq!(
            escape_text("Zo\u{eb} \u{201c}A1\u{201d} \u{20ac}5").expect("encodable"),
            vec![b'Z', b'o', 0xEB, b' ', 0x93, b'A', b'1', 0x94, b' ', 0x80, b'5']
        );
        assert_eq!(escape_text("a\u{0085}b").expect("controls dropped"), b"ab".to_vec());
    }

    #[test]
    fn refuses_text_outside_the_font_encoding() {
        assert!(pdf_renderable("Zo\u{eb} \u{2013} \u{20ac}"));
        assert!(!pdf_renderable("\u{0416}\u{0435}\u{043d}\u{044f}"));
        assert!(matches!(
            render_text_pdf("Lease", &["Tenant: \u{738b}\u{82b3}".to_string()]),
            Err(TemplateError::Unrenderable('\u{738b}'))
        ));
    }
}
