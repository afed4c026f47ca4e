use crate::prelude::*;

/// Telegram rejects messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 4096;

pub fn format_date(date: DateTime) -> String {
  date.format("%d.%m.%Y %H:%M").to_string()
}

/// Splits `text` on line boundaries into chunks of at most `limit`
/// characters (`0` means [`MESSAGE_LIMIT`]). Never returns an empty list.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
  let limit = if limit == 0 { MESSAGE_LIMIT } else { limit };
  let mut chunks = Vec::new();
  let mut current = String::new();

  for line in text.split_inclusive('\n') {
    if !current.is_empty() && current.chars().count() + line.chars().count() > limit {
      chunks.push(std::mem::take(&mut current));
    }

    // a single oversized line is cut hard
    let mut line = line;
    while line.chars().count() > limit {
      let cut = line.char_indices().nth(limit).map_or(line.len(), |(i, _)| i);
      chunks.push(line[..cut].to_string());
      line = &line[cut..];
    }
    current.push_str(line);
  }

  if !current.is_empty() || chunks.is_empty() {
    chunks.push(current);
  }
  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_date() {
    let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 7)
      .unwrap()
      .and_hms_opt(9, 5, 0)
      .unwrap();
    assert_eq!(format_date(date), "07.03.2025 09:05");
  }

  #[test]
  fn test_chunk_message() {
    assert_eq!(chunk_message("", 0), vec![""]);
    assert_eq!(chunk_message("short", 0), vec!["short"]);

    let chunks = chunk_message("aaaa\nbbbb\ncccc\n", 10);
    assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);

    let chunks = chunk_message("abcdefghij", 4);
    assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    let chunks = chunk_message(&"x\n".repeat(5000), 0);
    assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_LIMIT));
  }
}
