use crate::config::ModelType;
use crate::models::knn::KnnClassifier;
use crate::models::random_forest::RandomForestClassifier;
use crate::models::svm::SvmClassifier;
use crate::models::Model;

/// Build an unfitted classifier from a `ModelType`, announcing the
/// configuration before returning it.
pub fn build_model(model_type: &ModelType) -> Model {
    log::info!("{}", model_type.describe());

    match model_type {
        ModelType::Knn {
            n_neighbors,
            algorithm,
            n_jobs,
        } => Model::Knn(KnnClassifier::new(*n_neighbors, *algorithm, *n_jobs)),

        ModelType::Svm {
            kernel,
            c,
            tol,
            max_iter,
            random_state,
        } => Model::Svm(SvmClassifier::new(kernel.clone(), *c, *tol, *max_iter, *random_state)),

        ModelType::RandomForest {
            n_estimators,
            random_state,
            max_depth,
            min_samples_split,
            max_features,
        } => Model::RandomForest(RandomForestClassifier::new(
            *n_estimators,
            *random_state,
            *max_depth,
            *min_samples_split,
            *max_features,
        )),
    }
}
