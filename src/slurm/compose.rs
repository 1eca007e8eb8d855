use log::debug;
use thiserror::Error;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::slurm::catalog::TemplateCatalog;
use crate::slurm::fragment::{Bindings, Fragment};

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("can't render {fragment}: missing required bindings {}", .missing.join(", "))]
    MissingBindings {
        fragment: Fragment,
        missing: Vec<&'static str>,
    },
    #[error("invalid {fragment} template: {source}")]
    Template {
        fragment: Fragment,
        #[source]
        source: tinytemplate::error::Error,
    },
    #[error("failed to render {fragment}: {source}")]
    Render {
        fragment: Fragment,
        #[source]
        source: tinytemplate::error::Error,
    },
}

/// Where the payload section of a script comes from
#[derive(Debug, Clone, Copy)]
pub enum PayloadSource<'a> {
    /// Render the commands fragment with these bindings
    Commands(&'a Bindings),
    /// Use this text verbatim (an embedded script), without rendering
    Embedded(&'a str),
}

/// The five rendered sections of a submission script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSections {
    pub job_header: String,
    pub run_header: String,
    pub setup: String,
    pub payload: String,
    pub teardown: String,
}

impl ScriptSections {
    /// Concatenate the sections in their fixed order. Empty sections are kept in place.
    pub fn script(&self) -> String {
        // order is important: sbatch stops reading directives at the first command
        [
            self.job_header.as_str(),
            self.run_header.as_str(),
            self.setup.as_str(),
            self.payload.as_str(),
            self.teardown.as_str(),
        ]
        .concat()
    }
}

/// Renders fragments from a [`TemplateCatalog`]
///
/// Rendering is a pure function of the bindings and the catalog's template text, so a composer can
/// be reused for any number of jobs.
pub struct Composer<'c> {
    templates: TinyTemplate<'c>,
}

impl<'c> Composer<'c> {
    /// Compile every template in the catalog. Template syntax errors are reported here.
    pub fn new(catalog: &'c TemplateCatalog) -> Result<Self, ComposeError> {
        let mut templates = TinyTemplate::new();
        // scripts are shell, not HTML
        templates.set_default_formatter(&format_unescaped);
        for fragment in Fragment::ALL {
            templates
                .add_template(fragment.template_name(), catalog.source(fragment))
                .map_err(|source| ComposeError::Template { fragment, source })?;
        }
        Ok(Composer { templates })
    }

    /// Render one fragment, refusing to render when a required binding is missing
    pub fn render_fragment(
        &self,
        fragment: Fragment,
        bindings: &Bindings,
    ) -> Result<String, ComposeError> {
        validate(fragment, bindings)?;
        debug!("Rendering {fragment}");
        self.templates
            .render(fragment.template_name(), &fragment.context(bindings))
            .map_err(|source| ComposeError::Render { fragment, source })
    }

    /// Render all five fragments and return the assembled script
    pub fn compose(
        &self,
        job: &Bindings,
        run: &Bindings,
        setup: &Bindings,
        payload: &Bindings,
        teardown: &Bindings,
    ) -> Result<String, ComposeError> {
        let sections =
            self.compose_sections(job, run, setup, PayloadSource::Commands(payload), teardown)?;
        Ok(sections.script())
    }

    /// Render every section
    ///
    /// All fragments are validated before any is rendered, so a failure never leaves behind a
    /// partially rendered script.
    pub fn compose_sections(
        &self,
        job: &Bindings,
        run: &Bindings,
        setup: &Bindings,
        payload: PayloadSource<'_>,
        teardown: &Bindings,
    ) -> Result<ScriptSections, ComposeError> {
        validate(Fragment::JobHeader, job)?;
        validate(Fragment::RunHeader, run)?;
        validate(Fragment::Setup, setup)?;
        if let PayloadSource::Commands(bindings) = payload {
            validate(Fragment::Payload, bindings)?;
        }
        validate(Fragment::Teardown, teardown)?;

        let payload = match payload {
            PayloadSource::Commands(bindings) => self.render_fragment(Fragment::Payload, bindings)?,
            PayloadSource::Embedded(text) => text.to_string(),
        };

        Ok(ScriptSections {
            job_header: self.render_fragment(Fragment::JobHeader, job)?,
            run_header: self.render_fragment(Fragment::RunHeader, run)?,
            setup: self.render_fragment(Fragment::Setup, setup)?,
            payload,
            teardown: self.render_fragment(Fragment::Teardown, teardown)?,
        })
    }
}

fn validate(fragment: Fragment, bindings: &Bindings) -> Result<(), ComposeError> {
    let missing = fragment.missing_bindings(bindings);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ComposeError::MissingBindings { fragment, missing })
    }
}
