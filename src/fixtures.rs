#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    use crate::schema::ConfigsType;
    use crate::types::ValueKind;

    /// A small trainer schema.
    ///
    /// - `batch_size`: default rule, 64
    /// - `lr`: `batch_size / 6400.0`
    /// - `epochs`: literal default 10
    /// - `steps`: `epochs * 60000 / batch_size`
    /// - `log_interval`: default rule, 10, no dependencies
    /// - `metrics`: list of `"loss"` then `"accuracy"`
    pub fn trainer_configs() -> Arc<ConfigsType> {
        ConfigsType::builder("TrainerConfigs")
            .key("batch_size", ValueKind::Integer)
            .key("lr", ValueKind::Float)
            .key("epochs", ValueKind::Integer)
            .default_value("epochs", 10)
            .calc("batch_size", &[], |_| Ok(64))
            .calc("lr", &["batch_size"], |cx| {
                Ok(cx.integer("batch_size")? as f64 / 6400.0)
            })
            .calc("steps", &["epochs", "batch_size"], |cx| {
                Ok(cx.integer("epochs")? * 60000 / cx.integer("batch_size")?)
            })
            .calc("log_interval", &[], |_| Ok(10))
            .append("metrics", &[], |_| Ok("loss"))
            .append("metrics", &[], |_| Ok("accuracy"))
            .build()
            .unwrap()
    }

    /// Two named dataset options and a key derived from the choice.
    pub fn dataset_configs() -> Arc<ConfigsType> {
        ConfigsType::builder("DatasetConfigs")
            .option("dataset", "mnist", &[], |_| Ok("mnist"))
            .option("dataset", "cifar", &[], |_| Ok("cifar10"))
            .calc("input_size", &["dataset"], |cx| match cx.string("dataset")? {
                "mnist" => Ok(784),
                "cifar10" => Ok(3072),
                other => Err(cx.fail(format!("unsupported dataset {other}"))),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn fixtures_build() {
        assert_eq!(trainer_configs().name(), "TrainerConfigs");
        assert_eq!(dataset_configs().rules().len(), 3);
    }
}
