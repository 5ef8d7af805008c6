use llamadeck_core::ModelDescriptor;

/// Where a front end lands on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartScreen {
    /// Nothing installed, or the server is unreachable: offer the catalog and a pull.
    Setup,
    Chat { models: Vec<ModelDescriptor> },
}

impl StartScreen {
    pub fn from_models(models: Vec<ModelDescriptor>) -> Self {
        match models.is_empty() {
            true => StartScreen::Setup,
            false => StartScreen::Chat { models },
        }
    }
}
