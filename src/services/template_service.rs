use crate::{
    dao::models::SessionTemplate,
    dto::retro::{CategorySummary, TemplateSummary},
    error::ServiceError,
};

/// Every board layout, in catalogue order.
pub fn templates() -> Vec<TemplateSummary> {
    SessionTemplate::ALL.into_iter().map(describe).collect()
}

/// Look up one layout by its wire id.
pub fn template(id: &str) -> Result<TemplateSummary, ServiceError> {
    id.parse::<SessionTemplate>()
        .map(describe)
        .map_err(ServiceError::NotFound)
}

fn describe(template: SessionTemplate) -> TemplateSummary {
    let (name, description) = match template {
        SessionTemplate::StartStopContinue => (
            "Start, Stop, Continue",
            "What to start doing, stop doing and keep doing",
        ),
        SessionTemplate::FourLs => ("4Ls", "Liked, Learned, Lacked, Longed for"),
        SessionTemplate::MadSadGlad => ("Mad, Sad, Glad", "How the team felt during the period"),
        SessionTemplate::Sailboat => (
            "Sailboat",
            "What pushes the team forward and what holds it back",
        ),
        SessionTemplate::WentWellToImprove => (
            "Went Well | To Improve",
            "What worked and what could be better",
        ),
    };

    TemplateSummary {
        id: template,
        name: name.to_string(),
        description: description.to_string(),
        categories: template
            .categories()
            .iter()
            .map(|id| CategorySummary {
                id: (*id).to_string(),
                name: display_name(id),
            })
            .collect(),
    }
}

/// `longed_for` -> `Longed For`.
fn display_name(id: &str) -> String {
    id.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_lists_every_template_with_its_categories() {
        let catalogue = templates();
        assert_eq!(catalogue.len(), SessionTemplate::ALL.len());

        let four_ls = &catalogue[1];
        assert_eq!(four_ls.id, SessionTemplate::FourLs);
        let names: Vec<&str> = four_ls.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Liked", "Learned", "Lacked", "Longed For"]);
    }

    #[test]
    fn lookup_by_wire_id() {
        assert_eq!(template("sailboat").unwrap().categories.len(), 4);
        assert!(matches!(template("kanban"), Err(ServiceError::NotFound(_))));
    }
}
