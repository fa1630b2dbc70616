//! Template populations: the initial set and each new generation.

use super::template::Template;
use crate::error::{ForecastError, Result};
use crate::models::{ModelName, ModelSpec};
use crate::transform::{FillNa, TransformationParameters, Transformer, TransformerKind};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How the first population is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitialTemplate {
    /// The curated base set only.
    General,
    /// Randomly sampled templates only.
    Random,
    /// Base set plus random templates.
    #[default]
    #[serde(rename = "General+Random")]
    GeneralRandom,
}

impl fmt::Display for InitialTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitialTemplate::General => "General",
            InitialTemplate::Random => "Random",
            InitialTemplate::GeneralRandom => "General+Random",
        })
    }
}

impl FromStr for InitialTemplate {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "general" => Ok(InitialTemplate::General),
            "random" => Ok(InitialTemplate::Random),
            "general+random" => Ok(InitialTemplate::GeneralRandom),
            _ => Err(ForecastError::InvalidParameter(format!(
                "unknown initial_template '{s}'"
            ))),
        }
    }
}

/// Models, transformers and depth the search may draw from.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpace {
    models: Vec<ModelName>,
    transformers: Vec<TransformerKind>,
    max_depth: usize,
}

impl TemplateSpace {
    pub fn new(
        models: Vec<ModelName>,
        transformers: Vec<TransformerKind>,
        max_depth: usize,
    ) -> Result<Self> {
        if models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "template space has no models".to_string(),
            ));
        }
        if models.contains(&ModelName::Ensemble) {
            return Err(ForecastError::InvalidParameter(
                "ensembles cannot be sampled directly".to_string(),
            ));
        }
        Ok(Self {
            models,
            transformers,
            max_depth,
        })
    }

    pub fn models(&self) -> &[ModelName] {
        &self.models
    }

    pub fn transformers(&self) -> &[TransformerKind] {
        &self.transformers
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Each model at its defaults, bare and with the first parameterless
    /// transformer of the list.
    pub fn general_templates(&self) -> Vec<Template> {
        let first_transformer = self
            .transformers
            .iter()
            .find_map(|&k| Transformer::parameterless(k))
            .filter(|_| self.max_depth > 0);

        let mut out = Vec::new();
        for &name in &self.models {
            let Ok(spec) = ModelSpec::default_for(name) else {
                continue;
            };
            out.push(Template::new(spec.clone(), TransformationParameters::default()));
            if let Some(t) = &first_transformer {
                out.push(Template::new(
                    spec,
                    TransformationParameters::new(FillNa::Ffill, vec![t.clone()]),
                ));
            }
        }
        out
    }

    pub fn random_template<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Template> {
        let name = *self.models.choose(rng).ok_or(ForecastError::EmptyData)?;
        Ok(Template::new(
            ModelSpec::random(name, rng)?,
            TransformationParameters::random(&self.transformers, self.max_depth, rng),
        ))
    }

    /// Child with perturbed model parameters.
    pub fn mutate_model<R: Rng + ?Sized>(&self, parent: &Template, rng: &mut R) -> Template {
        Template::new(parent.model().mutate(rng), parent.transformation().clone())
    }

    /// Child with an edited transformation chain.
    pub fn mutate_transformation<R: Rng + ?Sized>(
        &self,
        parent: &Template,
        rng: &mut R,
    ) -> Template {
        Template::new(
            parent.model().clone(),
            parent
                .transformation()
                .mutate(&self.transformers, self.max_depth, rng),
        )
    }

    /// Child taking the model of `a` and the transformation chain of `b`.
    pub fn crossover(&self, a: &Template, b: &Template) -> Template {
        Template::new(a.model().clone(), b.transformation().clone())
    }

    /// First population, deduplicated by id in generation order.
    pub fn initial_population<R: Rng + ?Sized>(
        &self,
        policy: InitialTemplate,
        random_count: usize,
        rng: &mut R,
    ) -> Result<Vec<Template>> {
        let mut candidates = Vec::new();
        if matches!(policy, InitialTemplate::General | InitialTemplate::GeneralRandom) {
            candidates.extend(self.general_templates());
        }
        if matches!(policy, InitialTemplate::Random | InitialTemplate::GeneralRandom) {
            for _ in 0..random_count {
                candidates.push(self.random_template(rng)?);
            }
        }

        let mut seen = BTreeSet::new();
        candidates.retain(|t| seen.insert(t.id().to_string()));
        if candidates.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "initial population is empty".to_string(),
            ));
        }
        Ok(candidates)
    }

    /// Up to `size` templates bred from `survivors` that are not in `seen`.
    ///
    /// Operators: model mutation (40%), transformation mutation (30%),
    /// crossover (15%), fresh random template (15%).
    pub fn next_generation<R: Rng + ?Sized>(
        &self,
        survivors: &[Template],
        size: usize,
        seen: &BTreeSet<String>,
        rng: &mut R,
    ) -> Result<Vec<Template>> {
        let parents: Vec<&Template> = survivors.iter().filter(|t| !t.is_ensemble()).collect();
        let mut out: Vec<Template> = Vec::with_capacity(size);
        let mut taken: BTreeSet<String> = BTreeSet::new();
        let max_attempts = size.saturating_mul(20).max(20);

        for _ in 0..max_attempts {
            if out.len() >= size {
                break;
            }
            let roll: f64 = rng.gen();
            let child = match parents.choose(rng) {
                Some(parent) if roll < 0.4 => self.mutate_model(parent, rng),
                Some(parent) if roll < 0.7 => self.mutate_transformation(parent, rng),
                Some(parent) if roll < 0.85 => match parents.choose(rng) {
                    Some(other) => self.crossover(parent, other),
                    None => self.random_template(rng)?,
                },
                _ => self.random_template(rng)?,
            };
            if seen.contains(child.id()) || !taken.insert(child.id().to_string()) {
                continue;
            }
            out.push(child);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn space() -> TemplateSpace {
        TemplateSpace::new(
            ModelName::SEARCHABLE.to_vec(),
            TransformerKind::preset("fast").unwrap(),
            3,
        )
        .unwrap()
    }

    fn ids(templates: &[Template]) -> Vec<String> {
        templates.iter().map(|t| t.id().to_string()).collect()
    }

    #[test]
    fn general_set_is_deterministic() {
        let a = space().general_templates();
        let b = space().general_templates();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.len(), 2 * ModelName::SEARCHABLE.len());
        assert!(a.iter().all(|t| t.transformation().transformations.len() <= 1));
    }

    #[test]
    fn seeded_population_is_reproducible() {
        let space = space();
        let mut rng1 = StdRng::seed_from_u64(2022);
        let mut rng2 = StdRng::seed_from_u64(2022);
        let a = space
            .initial_population(InitialTemplate::GeneralRandom, 15, &mut rng1)
            .unwrap();
        let b = space
            .initial_population(InitialTemplate::GeneralRandom, 15, &mut rng2)
            .unwrap();
        assert_eq!(ids(&a), ids(&b));

        let unique: BTreeSet<String> = ids(&a).into_iter().collect();
        assert_eq!(unique.len(), a.len());
    }

    #[test]
    fn random_templates_respect_space() {
        let space = TemplateSpace::new(
            vec![ModelName::LastValueNaive, ModelName::Ets],
            vec![TransformerKind::Detrend, TransformerKind::RollingMean],
            2,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let t = space.random_template(&mut rng).unwrap();
            assert!(space.models().contains(&t.model_name()));
            assert!(t.transformation().transformations.len() <= 2);
            assert!(t
                .transformation()
                .transformations
                .iter()
                .all(|tr| space.transformers().contains(&tr.kind())));
        }
    }

    #[test]
    fn next_generation_skips_seen_templates() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(1);
        let survivors = space.general_templates();
        let seen: BTreeSet<String> = ids(&survivors).into_iter().collect();
        let children = space.next_generation(&survivors, 10, &seen, &mut rng).unwrap();

        assert!(!children.is_empty());
        assert!(children.len() <= 10);
        assert!(children.iter().all(|c| !seen.contains(c.id())));
        assert!(children
            .iter()
            .all(|c| c.transformation().transformations.len() <= space.max_depth()));
    }

    #[test]
    fn rejects_ensemble_in_space() {
        assert!(TemplateSpace::new(vec![ModelName::Ensemble], vec![], 1).is_err());
        assert!(TemplateSpace::new(vec![], vec![], 1).is_err());
    }

    #[test]
    fn initial_template_names() {
        assert_eq!(
            "General+Random".parse::<InitialTemplate>().unwrap(),
            InitialTemplate::GeneralRandom
        );
        let json = serde_json::to_string(&InitialTemplate::GeneralRandom).unwrap();
        assert_eq!(json, "\"General+Random\"");
    }
}
