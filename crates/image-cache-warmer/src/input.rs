//! Work list parsing
//!
//! One `<category> <url>` pair per line. Blank lines and `#` comments are
//! skipped.

use crate::error::{Result, WarmerError};
use image_cache_client::{ImageCategory, PreloadItem};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub fn parse_line(line: &str) -> Result<Option<PreloadItem>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(category), Some(url), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(WarmerError::Parse(format!(
            "expected '<category> <url>', got {:?}",
            line
        )));
    };

    let category = category.parse::<ImageCategory>().map_err(WarmerError::Parse)?;
    Ok(Some(PreloadItem::new(url, category)))
}

/// Read every item from `reader`, failing on the first malformed line.
pub async fn read_items<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<PreloadItem>> {
    let mut lines = reader.lines();
    let mut items = Vec::new();
    let mut number = 0usize;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        match parse_line(&line) {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(WarmerError::Parse(msg)) => {
                return Err(WarmerError::Parse(format!("line {}: {}", number, msg)));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let item = parse_line("artist https://i.scdn.co/image/ab67").unwrap().unwrap();
        assert_eq!(item.category, ImageCategory::Artist);
        assert_eq!(item.url, "https://i.scdn.co/image/ab67");

        let item = parse_line("  playlist\thttps://mosaic.scdn.co/640/x  ").unwrap().unwrap();
        assert_eq!(item.category, ImageCategory::Playlist);
    }

    #[test]
    fn test_skips_blank_and_comments() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# user avatars").unwrap().is_none());
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert!(parse_line("artist").is_err());
        assert!(parse_line("artist https://a/1 extra").is_err());
        assert!(matches!(
            parse_line("album https://a/1"),
            Err(WarmerError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_read_items() {
        let input = b"# warm list\nartist https://a/1\n\nuser https://a/2\n" as &[u8];
        let items = read_items(input).await.unwrap();
        assert_eq!(
            items,
            vec![
                PreloadItem::new("https://a/1", ImageCategory::Artist),
                PreloadItem::new("https://a/2", ImageCategory::User),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_items_reports_line_number() {
        let input = b"artist https://a/1\nbogus\n" as &[u8];
        let err = read_items(input).await.unwrap_err();
        assert!(matches!(err, WarmerError::Parse(msg) if msg.starts_with("line 2:")));
    }
}
