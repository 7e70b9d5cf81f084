//! HLS C++ code emission.
//!
//! An operator configuration is rendered into a set of fragments, each keyed
//! by the placeholder it replaces in a caller supplied source template. The
//! fragments only reference the type aliases and stream names they define
//! themselves, so any template that places `$DEFINES$` before the other
//! fragments compiles against the `attention.hpp` library header.

mod fragments;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::core::{OperatorConfig, Result};

/// Template placeholder a fragment is substituted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fragment {
    Globals,
    Defines,
    ReadNpyData,
    StreamDeclarations,
    DoCompute,
    DataOutStream,
    SaveAsCNpy,
    BlackBoxFunction,
    Pragmas,
}

impl Fragment {
    pub const ALL: [Fragment; 9] = [
        Fragment::Globals,
        Fragment::Defines,
        Fragment::ReadNpyData,
        Fragment::StreamDeclarations,
        Fragment::DoCompute,
        Fragment::DataOutStream,
        Fragment::SaveAsCNpy,
        Fragment::BlackBoxFunction,
        Fragment::Pragmas,
    ];

    pub fn placeholder(&self) -> &'static str {
        match self {
            Fragment::Globals => "$GLOBALS$",
            Fragment::Defines => "$DEFINES$",
            Fragment::ReadNpyData => "$READNPYDATA$",
            Fragment::StreamDeclarations => "$STREAMDECLARATIONS$",
            Fragment::DoCompute => "$DOCOMPUTE$",
            Fragment::DataOutStream => "$DATAOUTSTREAM$",
            Fragment::SaveAsCNpy => "$SAVEASCNPY$",
            Fragment::BlackBoxFunction => "$BLACKBOXFUNCTION$",
            Fragment::Pragmas => "$PRAGMAS$",
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.placeholder())
    }
}

/// Rendered source lines per fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    fragments: BTreeMap<Fragment, Vec<String>>,
}

impl GeneratedCode {
    /// Lines of one fragment. Fragments that render to nothing are empty.
    pub fn get(&self, fragment: Fragment) -> &[String] {
        self.fragments
            .get(&fragment)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Lines of one fragment joined by newlines.
    pub fn render(&self, fragment: Fragment) -> String {
        self.get(fragment).join("\n")
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fragment, &[String])> {
        self.fragments
            .iter()
            .map(|(fragment, lines)| (*fragment, lines.as_slice()))
    }

    /// Substitutes every placeholder in `template` with its rendered fragment.
    pub fn instantiate(&self, template: &str) -> String {
        Fragment::ALL
            .iter()
            .fold(template.to_string(), |source, fragment| {
                source.replace(fragment.placeholder(), &self.render(*fragment))
            })
    }

    fn insert(&mut self, fragment: Fragment, lines: Vec<String>) {
        self.fragments.insert(fragment, lines);
    }
}

impl OperatorConfig {
    /// Renders every fragment for node `node_name`.
    ///
    /// Simulation code reads and writes its `.npy` artifacts in
    /// `code_gen_dir`. The configuration is validated first and nothing is
    /// rendered when validation fails.
    pub fn generate_code(&self, node_name: &str, code_gen_dir: &Path) -> Result<GeneratedCode> {
        self.validate()?;

        let mut code = GeneratedCode::default();
        code.insert(Fragment::Globals, fragments::globals());
        code.insert(Fragment::Defines, fragments::defines(self));
        code.insert(
            Fragment::ReadNpyData,
            fragments::read_npy_data(self, code_gen_dir),
        );
        code.insert(
            Fragment::StreamDeclarations,
            fragments::stream_declarations(self),
        );
        code.insert(Fragment::DoCompute, fragments::docompute(self));
        code.insert(
            Fragment::DataOutStream,
            fragments::data_out_stream(self, code_gen_dir)?,
        );
        code.insert(Fragment::SaveAsCNpy, Vec::new());
        code.insert(
            Fragment::BlackBoxFunction,
            fragments::blackbox_function(self, node_name),
        );
        code.insert(Fragment::Pragmas, fragments::pragmas(self));

        log::debug!(
            "attention::codegen rendered {} fragments for {node_name}",
            code.fragments.len()
        );
        Ok(code)
    }
}
