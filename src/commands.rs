/// Available shell commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "go",
    aliases: &["g", "nav"],
    usage: "go <hash>",
    description: "Navigate, e.g. go #/article/ai-medicine-research",
  },
  Command {
    name: "search",
    aliases: &["query"],
    usage: "search [text]",
    description: "Set or clear the search text",
  },
  Command {
    name: "sort",
    aliases: &[],
    usage: "sort <new|read>",
    description: "Change article list ordering",
  },
  Command {
    name: "save",
    aliases: &["mark"],
    usage: "save <article-id>",
    description: "Toggle an article in the saved list",
  },
  Command {
    name: "clear-saved",
    aliases: &["cs"],
    usage: "clear-saved",
    description: "Empty the saved list",
  },
  Command {
    name: "theme",
    aliases: &["t"],
    usage: "theme",
    description: "Toggle light/dark theme",
  },
  Command {
    name: "overlay",
    aliases: &["o"],
    usage: "overlay <sections|search|subscribe|close>",
    description: "Open or close an overlay",
  },
  Command {
    name: "subscribe",
    aliases: &["sub"],
    usage: "subscribe <email>",
    description: "Record a newsletter address locally",
  },
  Command {
    name: "tip",
    aliases: &[],
    usage: "tip <link> [note]",
    description: "Save a reader tip locally",
  },
  Command {
    name: "fetch",
    aliases: &["get"],
    usage: "fetch <url>",
    description: "Fetch a URL through the offline cache",
  },
  Command {
    name: "reload",
    aliases: &[],
    usage: "reload",
    description: "Re-read persisted state written by another instance",
  },
  Command {
    name: "dismiss",
    aliases: &[],
    usage: "dismiss",
    description: "Dismiss the current toast",
  },
  Command {
    name: "retry",
    aliases: &[],
    usage: "retry",
    description: "Clear a surfaced network error",
  },
  Command {
    name: "state",
    aliases: &["show"],
    usage: "state",
    description: "Print the full state snapshot",
  },
  Command {
    name: "help",
    aliases: &["?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit offprint",
  },
];

/// Resolve an input word to a command by exact name or alias.
pub fn resolve(input: &str) -> Option<&'static Command> {
  let input_lower = input.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == input_lower || cmd.aliases.contains(&input_lower.as_str()))
}

/// Get suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_resolve_exact_and_alias() {
    assert_eq!(resolve("go").unwrap().name, "go");
    assert_eq!(resolve("g").unwrap().name, "go");
    assert_eq!(resolve("q").unwrap().name, "quit");
    assert!(resolve("teleport").is_none());
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("sub");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "subscribe");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("etch");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "fetch");
  }
}
