/// Arrow schema for the model's tabular input.
///
/// Column names, order and types are fixed by the trained artifact; changing
/// any of them requires retraining.
pub mod model {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;

    use crate::features::FeatureVector;

    /// Feature columns in training order.
    pub const FEATURE_COLUMNS: [&str; 6] = ["age", "children", "smoker", "bmi", "sex", "region"];

    /// Schema of the feature table.
    pub fn feature_table_schema() -> Schema {
        Schema::new(vec![
            Field::new("age", DataType::Int64, false),
            Field::new("children", DataType::Int64, false),
            Field::new("smoker", DataType::Utf8, false),
            Field::new("bmi", DataType::Float64, false),
            Field::new("sex", DataType::Utf8, false),
            Field::new("region", DataType::Utf8, false),
        ])
    }

    /// Build a feature table with one row per feature vector.
    pub fn feature_table(rows: &[FeatureVector]) -> Result<RecordBatch, ArrowError> {
        let age = Int64Array::from_iter_values(rows.iter().map(|r| i64::from(r.age)));
        let children = Int64Array::from_iter_values(rows.iter().map(|r| i64::from(r.children)));
        let smoker = StringArray::from_iter_values(rows.iter().map(|r| r.smoker.as_str()));
        let bmi = Float64Array::from_iter_values(rows.iter().map(|r| r.bmi));
        let sex = StringArray::from_iter_values(rows.iter().map(|r| r.sex.as_str()));
        let region = StringArray::from_iter_values(rows.iter().map(|r| r.region.as_str()));

        let columns: Vec<ArrayRef> = vec![
            Arc::new(age),
            Arc::new(children),
            Arc::new(smoker),
            Arc::new(bmi),
            Arc::new(sex),
            Arc::new(region),
        ];
        RecordBatch::try_new(Arc::new(feature_table_schema()), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::model::*;
    use crate::features::FeatureVector;
    use crate::input::{Region, Sex, Smoker};
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn row(bmi: f64) -> FeatureVector {
        FeatureVector {
            age: 30,
            children: 1,
            smoker: Smoker::No,
            bmi,
            sex: Sex::Female,
            region: Region::Southwest,
        }
    }

    #[test]
    fn schema_matches_training_column_order() {
        let schema = feature_table_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, FEATURE_COLUMNS);
    }

    #[test]
    fn feature_table_carries_values_verbatim() {
        let batch = feature_table(&[row(26.12), row(31.5)]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 6);

        let bmi = batch
            .column_by_name("bmi")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(bmi.value(0), 26.12);
        assert_eq!(bmi.value(1), 31.5);

        let age = batch
            .column_by_name("age")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(age.value(0), 30);

        let region = batch
            .column_by_name("region")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(region.value(0), "southwest");
        let smoker = batch
            .column_by_name("smoker")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(smoker.value(1), "no");
    }

    #[test]
    fn empty_feature_table() {
        let batch = feature_table(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 6);
    }
}
