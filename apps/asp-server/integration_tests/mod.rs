mod external_launcher;
