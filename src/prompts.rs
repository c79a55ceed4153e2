//! Prompt templates for the four model stages.
//!
//! Templates live in `prompts/*.md` and are compiled into the binary. They
//! use `{{field}}` placeholders which are filled from a typed data record in
//! a single pass, so text pasted into one placeholder is never re-scanned
//! for further placeholders.
//!
//! Every template has one required field; rendering is refused when that
//! field is empty.

use crate::error::{Error, Result};

/// The named templates known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Map,
    Reduce,
    FinalSummary,
    Script,
}

impl Template {
    pub fn name(self) -> &'static str {
        match self {
            Template::Map => "map",
            Template::Reduce => "reduce",
            Template::FinalSummary => "final-summary",
            Template::Script => "script",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Template::Map => include_str!("../prompts/map.md"),
            Template::Reduce => include_str!("../prompts/reduce.md"),
            Template::FinalSummary => include_str!("../prompts/summary.md"),
            Template::Script => include_str!("../prompts/script.md"),
        }
    }
}

/// A record whose fields can be looked up by placeholder name.
pub trait TemplateData {
    fn lookup(&self, field: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Copy)]
pub struct MapData<'a> {
    pub segment_text: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ReduceData<'a> {
    pub combined_text: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct FinalSummaryData<'a> {
    pub title: &'a str,
    pub intermediate_summary: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ScriptData<'a> {
    pub title: &'a str,
    pub final_summary_text: &'a str,
}

impl TemplateData for MapData<'_> {
    fn lookup(&self, field: &str) -> Option<&str> {
        match field {
            "segment_text" => Some(self.segment_text),
            _ => None,
        }
    }
}

impl TemplateData for ReduceData<'_> {
    fn lookup(&self, field: &str) -> Option<&str> {
        match field {
            "combined_text" => Some(self.combined_text),
            _ => None,
        }
    }
}

impl TemplateData for FinalSummaryData<'_> {
    fn lookup(&self, field: &str) -> Option<&str> {
        match field {
            "title" => Some(self.title),
            "intermediate_summary" => Some(self.intermediate_summary),
            _ => None,
        }
    }
}

impl TemplateData for ScriptData<'_> {
    fn lookup(&self, field: &str) -> Option<&str> {
        match field {
            "title" => Some(self.title),
            "final_summary_text" => Some(self.final_summary_text),
            _ => None,
        }
    }
}

/// Render `template` against `data` after `validate` has accepted it.
///
/// `validate` returns the name of the first required field that is empty,
/// or `None` when the record is complete.
pub fn build_prompt<D, V>(template: Template, data: &D, validate: V) -> Result<String>
where
    D: TemplateData,
    V: Fn(&D) -> Option<&'static str>,
{
    if let Some(field) = validate(data) {
        return Err(Error::PromptBuild {
            template: template.name(),
            field,
        });
    }
    Ok(render(template.source(), data))
}

fn require(value: &str, field: &'static str) -> Option<&'static str> {
    value.is_empty().then_some(field)
}

pub fn map_prompt(data: MapData<'_>) -> Result<String> {
    build_prompt(Template::Map, &data, |d| {
        require(d.segment_text, "segment_text")
    })
}

pub fn reduce_prompt(data: ReduceData<'_>) -> Result<String> {
    build_prompt(Template::Reduce, &data, |d| {
        require(d.combined_text, "combined_text")
    })
}

pub fn final_summary_prompt(data: FinalSummaryData<'_>) -> Result<String> {
    build_prompt(Template::FinalSummary, &data, |d| {
        require(d.intermediate_summary, "intermediate_summary")
    })
}

pub fn script_prompt(data: ScriptData<'_>) -> Result<String> {
    build_prompt(Template::Script, &data, |d| {
        require(d.final_summary_text, "final_summary_text")
    })
}

fn render<D: TemplateData>(source: &str, data: &D) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            // Unterminated placeholder: emit verbatim.
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after_open[..close].trim();
        match data.lookup(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    out.push_str(rest);
    out
}
