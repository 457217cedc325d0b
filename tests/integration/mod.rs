mod importer_end_to_end;
mod screener_rate_limit;
