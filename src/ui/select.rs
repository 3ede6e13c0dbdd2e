use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, FuzzySelect};

use crate::{http::ApiClient, projects::api, remote::ProjectDescriptor, ui::with_spinner};

use super::is_interactive;

/// Fuzzy select from a list of items. Requires TTY.
pub fn fuzzy_select<T: ToString>(prompt: &str, items: &[T]) -> Result<usize> {
    if !is_interactive() {
        bail!("interactive mode requires TTY");
    }

    if items.is_empty() {
        bail!("no items to select from");
    }

    let labels: Vec<String> = items.iter().map(|i| i.to_string()).collect();

    let selection = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(selection)
}

/// Pick one of the entity's projects on the service
pub async fn select_project_interactive(client: &ApiClient) -> Result<String> {
    let projects = with_spinner("Loading projects...", api::list_projects(client)).await?;

    if projects.is_empty() {
        bail!("no projects found for entity '{}'", client.entity());
    }

    let names = sorted_names(&projects);
    let selection = fuzzy_select("Select project", &names)?;
    Ok(names[selection].to_string())
}

fn sorted_names<P: ProjectDescriptor>(projects: &[P]) -> Vec<&str> {
    let mut names: Vec<&str> = projects.iter().map(ProjectDescriptor::name).collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl ProjectDescriptor for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn project_names_are_offered_sorted() {
        let projects = [Named("mnist"), Named("cifar"), Named("imagenet")];
        assert_eq!(sorted_names(&projects), vec!["cifar", "imagenet", "mnist"]);
    }
}
