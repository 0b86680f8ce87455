//! `SHOW GRANTS` statement processing.
//!
//! Statements are applied in order onto a [`UserPrivileges`] tree that was
//! seeded from the server's schema. Each statement is independently fallible:
//! a malformed line is reported and skipped.

use super::privileges::{self, Level, GRANT_OPTION, USAGE};
use super::{Database, Routine, RoutineKind, Table, UserPrivileges};
use crate::error::GrantParseError;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// One privilege of a statement, with its column list if it had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeSpec {
    pub name: String,
    pub columns: Vec<String>,
}

/// What a statement applies to, unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTarget {
    pub database: String,
    pub object: String,
    pub routine: Option<RoutineKind>,
}

impl GrantTarget {
    pub fn is_global(&self) -> bool {
        self.database == "*" && self.object == "*"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantStatement {
    pub is_grant: bool,
    pub privileges: Vec<PrivilegeSpec>,
    pub target: GrantTarget,
    pub with_grant_option: bool,
}

/// Union `delta` into `current` for a grant, subtract it for a revoke.
pub fn add_remove_privs<'a>(
    current: &mut BTreeSet<String>,
    delta: impl IntoIterator<Item = &'a str>,
    is_grant: bool,
) {
    for privilege in delta {
        if is_grant {
            current.insert(privilege.to_string());
        } else {
            current.remove(privilege);
        }
    }
}

/// Apply every statement in order, returning the ones that could not be processed.
pub fn process_grants(grants: &[String], privileges: &mut UserPrivileges) -> Vec<GrantParseError> {
    let parsed: Vec<Result<GrantStatement, GrantParseError>> =
        grants.iter().map(|g| parse_statement(g)).collect();

    // Every named database needs a node before attribution starts.
    for statement in parsed.iter().flatten() {
        let name = &statement.target.database;
        if name != "*" && !privileges.databases.contains_key(name) {
            debug!(database = %name, "adding placeholder for unknown database");
            privileges
                .databases
                .insert(name.clone(), Database::placeholder(name));
        }
    }

    let mut errors = Vec::new();
    for (raw, statement) in grants.iter().zip(parsed) {
        match statement.and_then(|s| apply(&s, raw, privileges)) {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "skipping grant statement");
                errors.push(e);
            }
        }
    }
    errors
}

pub fn parse_statement(text: &str) -> Result<GrantStatement, GrantParseError> {
    let fail = |reason: &str| GrantParseError {
        statement: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim().trim_end_matches(';').trim_end();
    let (is_grant, rest) = if let Some(rest) = strip_keyword(trimmed, "GRANT") {
        (true, rest)
    } else if let Some(rest) = strip_keyword(trimmed, "REVOKE") {
        (false, rest)
    } else {
        return Err(fail("not a GRANT or REVOKE statement"));
    };

    let (privilege_list, target_and_grantee) = rest
        .split_once(" ON ")
        .ok_or_else(|| fail("no ' ON ' clause"))?;

    let target_text = match (target_and_grantee.find(" TO "), target_and_grantee.find(" FROM ")) {
        (Some(to), Some(from)) => &target_and_grantee[..to.min(from)],
        (Some(i), None) | (None, Some(i)) => &target_and_grantee[..i],
        (None, None) => target_and_grantee,
    };
    let target = parse_target(target_text.trim()).map_err(|reason| fail(&reason))?;

    let privileges = parse_privileges(privilege_list).map_err(|reason| fail(&reason))?;
    if privileges.is_empty() {
        return Err(fail("empty privilege list"));
    }

    Ok(GrantStatement {
        is_grant,
        privileges,
        target,
        with_grant_option: trimmed.to_ascii_uppercase().ends_with("WITH GRANT OPTION"),
    })
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let rest = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace))
        .then(|| rest.trim_start())
}

fn parse_target(text: &str) -> Result<GrantTarget, String> {
    let (routine, object_path) = if let Some(rest) = strip_keyword(text, "PROCEDURE") {
        (Some(RoutineKind::Procedure), rest)
    } else if let Some(rest) = strip_keyword(text, "FUNCTION") {
        (Some(RoutineKind::Function), rest)
    } else if let Some(rest) = strip_keyword(text, "TABLE") {
        (None, rest)
    } else {
        (None, text)
    };

    let parts = split_outside_quotes(object_path, '.');
    let [database, object] = parts.as_slice() else {
        return Err(format!("target '{}' is not of the form <db>.<object>", text));
    };
    let database = unquote(database);
    let object = unquote(object);
    if database.is_empty() || object.is_empty() {
        return Err(format!("target '{}' has an empty name", text));
    }
    if database == "*" && object != "*" {
        return Err(format!("target '{}' names an object in every database", text));
    }
    if routine.is_some() && (database == "*" || object == "*") {
        return Err(format!("routine target '{}' must name a routine", text));
    }
    Ok(GrantTarget {
        database,
        object,
        routine,
    })
}

fn parse_privileges(list: &str) -> Result<Vec<PrivilegeSpec>, String> {
    let mut specs = Vec::new();
    for item in split_outside_quotes(list, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (name, columns) = match item.split_once('(') {
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("unbalanced column list in '{}'", item))?;
                let columns: Vec<String> = split_outside_quotes(inner, ',')
                    .iter()
                    .map(|c| unquote(c))
                    .filter(|c| !c.is_empty())
                    .collect();
                (name, columns)
            }
            None => (item, Vec::new()),
        };
        specs.push(PrivilegeSpec {
            name: normalize_privilege(name),
            columns,
        });
    }
    Ok(specs)
}

fn normalize_privilege(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Split on `sep` outside backticks, double quotes and parentheses.
fn split_outside_quotes(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in text.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None => match c {
                '`' | '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
                c => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

fn unquote(identifier: &str) -> String {
    let trimmed = identifier.trim();
    for quote in ['`', '"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            let doubled = format!("{quote}{quote}");
            return inner.replace(&doubled, &quote.to_string());
        }
    }
    trimmed.to_string()
}

/// Privileges of `statement` that apply at `level`. Column lists and unknown
/// names only attach where the statement itself points.
fn privileges_at(statement: &GrantStatement, level: Level, is_target: bool) -> BTreeSet<&'static str> {
    let mut out = BTreeSet::new();
    for spec in statement.privileges.iter().filter(|p| p.columns.is_empty()) {
        if privileges::is_all(&spec.name) {
            out.extend(privileges::all_at(level));
        } else if let Some(def) = privileges::lookup(&spec.name) {
            if def.name != USAGE && def.scope.allows(level) {
                out.insert(def.name);
            }
        }
    }
    if statement.with_grant_option && is_target && level != Level::Column {
        out.insert(GRANT_OPTION);
    }
    out
}

/// Dynamic or unrecognised privilege names, kept verbatim at the target level.
fn extra_privileges(statement: &GrantStatement, level: Level) -> Vec<&str> {
    statement
        .privileges
        .iter()
        .filter(|p| p.columns.is_empty())
        .map(|p| p.name.as_str())
        .filter(|name| !privileges::is_all(name) && privileges::lookup(name).is_none())
        .filter(|name| level == Level::Global || !privileges::is_dynamic(name))
        .collect()
}

fn apply(statement: &GrantStatement, raw: &str, user: &mut UserPrivileges) -> Result<(), GrantParseError> {
    let target = &statement.target;
    let is_grant = statement.is_grant;

    if target.is_global() {
        let global = privileges_at(statement, Level::Global, true);
        add_remove_privs(&mut user.global.privs, global.iter().copied(), is_grant);
        add_remove_privs(
            &mut user.global.privs,
            extra_privileges(statement, Level::Global),
            is_grant,
        );

        for database in user.databases.values_mut() {
            if database.default || database.nonexistent {
                continue;
            }
            fan_out_database(statement, database, false);
        }
        return Ok(());
    }

    let Some(database) = user.databases.get_mut(&target.database) else {
        return Err(GrantParseError {
            statement: raw.to_string(),
            reason: format!("unknown database '{}'", target.database),
        });
    };

    if target.object == "*" {
        fan_out_database(statement, database, true);
        return Ok(());
    }

    if let Some(kind) = target.routine {
        let routine = database
            .routines
            .entry((kind, target.object.clone()))
            .or_insert_with(|| Routine::placeholder(&target.object, kind));
        apply_routine(statement, routine, true);
        return Ok(());
    }

    let table = database
        .tables
        .entry(target.object.clone())
        .or_insert_with(|| Table::placeholder(&target.object));
    apply_table(statement, table, true);
    Ok(())
}

fn fan_out_database(statement: &GrantStatement, database: &mut Database, is_target: bool) {
    let is_grant = statement.is_grant;
    let privs = privileges_at(statement, Level::Database, is_target);
    add_remove_privs(&mut database.privs, privs.iter().copied(), is_grant);
    if is_target {
        add_remove_privs(
            &mut database.privs,
            extra_privileges(statement, Level::Database),
            is_grant,
        );
    }

    for table in database.tables.values_mut().filter(|t| !t.nonexistent) {
        apply_table(statement, table, false);
    }
    for routine in database.routines.values_mut().filter(|r| !r.nonexistent) {
        apply_routine(statement, routine, false);
    }
}

fn apply_table(statement: &GrantStatement, table: &mut Table, is_target: bool) {
    let is_grant = statement.is_grant;
    let privs = privileges_at(statement, Level::Table, is_target);
    add_remove_privs(&mut table.privs, privs.iter().copied(), is_grant);
    if !is_target {
        return;
    }
    add_remove_privs(
        &mut table.privs,
        extra_privileges(statement, Level::Table),
        is_grant,
    );

    for spec in statement.privileges.iter().filter(|p| !p.columns.is_empty()) {
        let column_level = privileges::lookup(&spec.name)
            .map(|def| def.scope.allows(Level::Column))
            .unwrap_or(false);
        if !column_level {
            debug!(privilege = %spec.name, table = %table.name, "privilege has no column scope");
            continue;
        }
        for column_name in &spec.columns {
            let column = table.column_mut(column_name);
            add_remove_privs(&mut column.privs, [spec.name.as_str()], is_grant);
        }
    }
}

fn apply_routine(statement: &GrantStatement, routine: &mut Routine, is_target: bool) {
    let privs = privileges_at(statement, Level::Routine, is_target);
    add_remove_privs(&mut routine.privs, privs.iter().copied(), statement.is_grant);
}
