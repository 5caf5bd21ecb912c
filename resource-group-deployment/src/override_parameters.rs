//! Parses template parameter overrides of the form `-name1 value1 -name2 "value 2" -name3 ["a", "b"]`.
//!
//! Quoted values are always strings. Values in `[]` or `{}` must be JSON. Any other value is JSON if it parses as a JSON
//! number, boolean or null, and a string otherwise.

use anyhow::Context;

pub(crate) fn parse(s: &str) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
	let mut result = serde_json::Map::new();

	let mut rest = s.trim_start();
	while !rest.is_empty() {
		let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		let (name, after_name) = rest.split_at(name_end);
		let name = name.strip_prefix('-').filter(|name| !name.is_empty()).with_context(|| format!("expected -name at {rest:?}"))?;

		let after_name = after_name.trim_start();
		if after_name.is_empty() {
			anyhow::bail!("parameter {name} has no value");
		}

		let (value, after_value) = value(after_name).with_context(|| format!("could not parse the value of parameter {name}"))?;
		log::debug!("overriding template parameter {name}");
		result.insert(name.to_owned(), serde_json::json!({ "value": value }));

		rest = after_value.trim_start();
	}

	Ok(result)
}

fn value(s: &str) -> anyhow::Result<(serde_json::Value, &str)> {
	match s.as_bytes()[0] {
		quote @ (b'"' | b'\'') => {
			let mut value = String::new();
			let mut chars = s[1..].char_indices();
			while let Some((i, c)) = chars.next() {
				match c {
					'\\' => match chars.next() {
						Some((_, escaped)) if escaped == char::from(quote) || escaped == '\\' => value.push(escaped),
						Some((_, escaped)) => { value.push('\\'); value.push(escaped); },
						None => value.push('\\'),
					},
					c if c == char::from(quote) => return Ok((value.into(), &s[1 + i + 1..])),
					c => value.push(c),
				}
			}
			Err(anyhow::anyhow!("unterminated quoted value"))
		},

		b'[' | b'{' => {
			let end = balanced_end(s).context("unbalanced brackets")?;
			let value = serde_json::from_str(&s[..end]).context("value is not valid JSON")?;
			Ok((value, &s[end..]))
		},

		_ => {
			let end = s.find(char::is_whitespace).unwrap_or(s.len());
			let (token, rest) = s.split_at(end);
			let value = match serde_json::from_str(token) {
				Ok(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_) | serde_json::Value::Null)) => value,
				_ => token.into(),
			};
			Ok((value, rest))
		},
	}
}

/// The index just past the bracket that closes the one `s` starts with, skipping over brackets inside JSON strings.
fn balanced_end(s: &str) -> Option<usize> {
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (i, c) in s.char_indices() {
		if in_string {
			match c {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'"' => in_string = false,
				_ => (),
			}
			continue;
		}

		match c {
			'"' => in_string = true,
			'[' | '{' => depth += 1,
			']' | '}' => {
				depth = depth.checked_sub(1)?;
				if depth == 0 {
					return Some(i + 1);
				}
			},
			_ => (),
		}
	}

	None
}

#[cfg(test)]
mod tests {
	#[test]
	fn parse() {
		let parameters = super::parse(r#" -adminUsername azureuser -vmSize "Standard D1" -count 3 -enabled true -zones ["1", "2 ]"] -tags {"env": "test"} -offset -5"#).unwrap();
		assert_eq!(serde_json::Value::Object(parameters), serde_json::json!({
			"adminUsername": { "value": "azureuser" },
			"vmSize": { "value": "Standard D1" },
			"count": { "value": 3 },
			"enabled": { "value": true },
			"zones": { "value": ["1", "2 ]"] },
			"tags": { "value": { "env": "test" } },
			"offset": { "value": -5 },
		}));
	}

	#[test]
	fn quoted_values_are_strings() {
		let parameters = super::parse(r#"-port '5986' -password "p@ss \"word\"""#).unwrap();
		assert_eq!(parameters["port"], serde_json::json!({ "value": "5986" }));
		assert_eq!(parameters["password"], serde_json::json!({ "value": "p@ss \"word\"" }));
	}

	#[test]
	fn empty() {
		assert!(super::parse("").unwrap().is_empty());
		assert!(super::parse("   ").unwrap().is_empty());
	}

	#[test]
	fn invalid() {
		super::parse("adminUsername azureuser").unwrap_err();
		super::parse("-adminUsername").unwrap_err();
		super::parse(r#"-name "unterminated"#).unwrap_err();
		super::parse(r#"-zones ["1", "2""#).unwrap_err();
		super::parse("-zones [1, 2,]").unwrap_err();
	}
}
