use crate::types::MetricValue;

/// Coerces a raw metric value: integer first, then finite float, otherwise text.
///
/// Never fails. Integers outside the `i64` range fall back to a float, and `inf`/`nan`
/// spellings stay text since they are not finite.
pub fn coerce_metric_value(raw: &str) -> MetricValue {
    if let Ok(value) = raw.parse::<i64>() {
        return MetricValue::Integer(value);
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => MetricValue::Float(value),
        _ => MetricValue::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_win_over_floats() {
        assert_eq!(coerce_metric_value("1024"), MetricValue::Integer(1024));
        assert_eq!(coerce_metric_value("-3"), MetricValue::Integer(-3));
    }

    #[test]
    fn decimals_become_floats() {
        assert_eq!(coerce_metric_value("3.5"), MetricValue::Float(3.5));
        assert_eq!(coerce_metric_value("1024.0"), MetricValue::Float(1024.0));
        assert_eq!(coerce_metric_value("1e3"), MetricValue::Float(1000.0));
        assert_eq!(
            coerce_metric_value("99999999999999999999"),
            MetricValue::Float(1e20)
        );
    }

    #[test]
    fn everything_else_is_text() {
        assert_eq!(
            coerce_metric_value("abc"),
            MetricValue::Text("abc".to_string())
        );
        assert_eq!(
            coerce_metric_value("8.8.8.8"),
            MetricValue::Text("8.8.8.8".to_string())
        );
        assert_eq!(
            coerce_metric_value("nan"),
            MetricValue::Text("nan".to_string())
        );
        assert_eq!(
            coerce_metric_value("inf"),
            MetricValue::Text("inf".to_string())
        );
    }
}
